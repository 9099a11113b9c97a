//! # Subscription Registry
//!
//! Single source of truth for which subjects the caller wants to hear about.
//! Entries survive reconnections; only an explicit unsubscribe or `close()`
//! removes them. While a connection is attached, changes are mirrored to the
//! server immediately through the session's outbound frame channel.
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::models::Subscription;
use crate::protocol::{self, StompFrame};

/// Sending half of the live session's writer queue.
pub type Outbound = mpsc::UnboundedSender<StompFrame>;

struct Entry {
    /// Stable `sub-<n>` id, reused on every replay.
    id: String,
    subscription: Subscription,
}

struct Attached {
    user_id: String,
    outbound: Outbound,
}

#[derive(Default)]
struct RegistryInner {
    // Registration order is replay order.
    entries: Vec<Entry>,
    next_id: u64,
    attached: Option<Attached>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subject. Re-adding an existing subject succeeds without
    /// sending anything. A new subject is sent right away when connected;
    /// otherwise it waits for the next replay.
    ///
    /// A send failure is returned to the caller but the entry stays
    /// registered, so the next reconnect retries it.
    pub fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let mut inner = self.lock();
        if inner.entries.iter().any(|e| e.subscription == subscription) {
            log::debug!("Already subscribed to {}", subscription);
            return Ok(());
        }

        let id = format!("sub-{}", inner.next_id);
        inner.next_id += 1;

        let frame = inner
            .attached
            .as_ref()
            .map(|a| (protocol::subscribe_frame(&id, &a.user_id, &subscription), a.outbound.clone()));

        log::info!("Registered subscription {} as {}", subscription, id);
        inner.entries.push(Entry { id, subscription });

        match frame {
            Some((frame, outbound)) => send(&outbound, frame),
            None => Ok(()),
        }
    }

    /// Removes a subject. Returns whether it was registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<bool> {
        let mut inner = self.lock();
        let Some(pos) = inner.entries.iter().position(|e| &e.subscription == subscription) else {
            return Ok(false);
        };
        let entry = inner.entries.remove(pos);
        log::info!("Removed subscription {} ({})", entry.subscription, entry.id);

        if let Some(attached) = &inner.attached {
            send(&attached.outbound, protocol::unsubscribe_frame(&entry.id))?;
        }
        Ok(true)
    }

    /// Removes every subject, sending UNSUBSCRIBE for each when connected.
    /// The registry is empty afterwards even if a send fails.
    pub fn unsubscribe_all(&self) -> Result<()> {
        let mut inner = self.lock();
        let entries = std::mem::take(&mut inner.entries);
        log::info!("Removing all {} subscription(s)", entries.len());

        let mut result = Ok(());
        if let Some(attached) = &inner.attached {
            for entry in &entries {
                if let Err(e) = send(&attached.outbound, protocol::unsubscribe_frame(&entry.id)) {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Called by the connection manager once a new connection is writable.
    ///
    /// Attaches the session's outbound channel and returns one SUBSCRIBE frame
    /// per registered subject, in registration order. Both happen under one
    /// lock, so a concurrent `subscribe` is either in the returned replay or
    /// sent through the new channel, never both and never neither.
    pub fn on_reconnected(&self, user_id: &str, outbound: Outbound) -> Vec<StompFrame> {
        let mut inner = self.lock();
        let frames = inner
            .entries
            .iter()
            .map(|e| protocol::subscribe_frame(&e.id, user_id, &e.subscription))
            .collect();
        inner.attached = Some(Attached {
            user_id: user_id.to_string(),
            outbound,
        });
        frames
    }

    /// Forgets the live session. Entries are kept for the next replay.
    pub fn detach(&self) {
        self.lock().attached = None;
    }

    /// Drops every entry without telling the server. Used on `close()`.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.attached = None;
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().entries.iter().map(|e| e.subscription.clone()).collect()
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.lock().entries.iter().any(|e| &e.subscription == subscription)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

fn send(outbound: &Outbound, frame: StompFrame) -> Result<()> {
    let command = frame.command.clone();
    outbound.send(frame).map_err(|_| {
        log::warn!("Outbound channel closed; {} not sent", command);
        SyncError::Send(format!("connection writer is gone, {} not sent", command))
    })
}
