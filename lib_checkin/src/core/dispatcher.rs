//! # Status Notification Dispatcher
//!
//! Turns inbound frames into typed status updates and derived user-facing
//! notifications, and fans them out on independent broadcast streams:
//!
//! - child status updates
//! - service capacity updates
//! - notifications
//!
//! Streams are replay-none: a receiver only sees events sent after it
//! subscribed. Senders never wait for receivers; a receiver that falls more
//! than the buffer size behind loses the oldest events (`RecvError::Lagged`).
//!
//! Anything that cannot be dispatched (malformed frame, unknown payload kind,
//! bad JSON) is logged and dropped, so newer server message types do not
//! disturb older clients.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DispatchError;
use crate::models::{
    ChildStatusUpdate, NotificationType, ServiceStatusUpdate, StatusNotification, StatusUpdate,
};
use crate::protocol::{commands, decode, Inbound, StompFrame};

/// Discriminator values carried in the MESSAGE body's `type` field.
pub const KIND_CHILD_STATUS: &str = "CHILD_STATUS";
pub const KIND_SERVICE_STATUS: &str = "SERVICE_STATUS";

/// MESSAGE body: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: Value,
}

/// What happened to one inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Heartbeat,
    /// A status update was emitted; `notified` tells whether a notification followed it.
    Update { notified: bool },
    /// A frame with no status payload (CONNECTED, RECEIPT, ERROR, ...).
    Control(String),
    Dropped,
}

pub struct StatusDispatcher {
    child_tx: broadcast::Sender<ChildStatusUpdate>,
    service_tx: broadcast::Sender<ServiceStatusUpdate>,
    notification_tx: broadcast::Sender<StatusNotification>,
    /// Capacity limits supplied by the caller for services whose updates omit `maxCapacity`.
    capacities: Mutex<HashMap<String, u32>>,
}

impl StatusDispatcher {
    pub fn new(buffer_size: usize) -> Self {
        let (child_tx, _) = broadcast::channel(buffer_size);
        let (service_tx, _) = broadcast::channel(buffer_size);
        let (notification_tx, _) = broadcast::channel(buffer_size);
        Self {
            child_tx,
            service_tx,
            notification_tx,
            capacities: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe_child_updates(&self) -> broadcast::Receiver<ChildStatusUpdate> {
        self.child_tx.subscribe()
    }

    pub fn subscribe_service_updates(&self) -> broadcast::Receiver<ServiceStatusUpdate> {
        self.service_tx.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<StatusNotification> {
        self.notification_tx.subscribe()
    }

    /// Records a service's capacity limit for updates that do not carry one.
    pub fn set_service_capacity(&self, service_id: impl Into<String>, max_capacity: u32) {
        self.capacities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_id.into(), max_capacity);
    }

    fn known_capacity(&self, service_id: &str) -> Option<u32> {
        self.capacities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_id)
            .copied()
    }

    /// Decodes and dispatches one inbound text message. Never fails: problems
    /// are logged and the message is dropped.
    pub fn handle_text(&self, raw: &str) -> Handled {
        match decode(raw) {
            Ok(Inbound::Heartbeat) => {
                log::trace!("Heartbeat received");
                Handled::Heartbeat
            }
            Ok(Inbound::Frame(frame)) => self.handle_frame(&frame),
            Err(e) => {
                log::warn!("Dropping undecodable frame: {} ({} bytes)", e, raw.len());
                Handled::Dropped
            }
        }
    }

    pub fn handle_frame(&self, frame: &StompFrame) -> Handled {
        match frame.command.as_str() {
            commands::MESSAGE => match self.dispatch(frame) {
                Ok(notified) => Handled::Update { notified },
                Err(e) => {
                    log::warn!("Dropping MESSAGE frame: {}", e);
                    Handled::Dropped
                }
            },
            commands::ERROR => {
                log::error!(
                    "Server reported an error: {} {}",
                    frame.get_header("message").unwrap_or("(no message header)"),
                    frame.body.trim()
                );
                Handled::Control(frame.command.clone())
            }
            other => {
                log::debug!("Received {} frame", other);
                Handled::Control(other.to_string())
            }
        }
    }

    /// Emits the update carried by a MESSAGE frame and, when warranted, its
    /// notification. Returns whether a notification was emitted.
    pub fn dispatch(&self, frame: &StompFrame) -> Result<bool, DispatchError> {
        let update = parse_update(frame)?;
        let notification = match &update {
            StatusUpdate::Child(child) => Some(child_notification(child)),
            StatusUpdate::Service(service) => {
                let max = service
                    .max_capacity
                    .or_else(|| self.known_capacity(&service.service_id));
                match max {
                    Some(max) => capacity_notification(service, max),
                    None => {
                        log::debug!(
                            "No capacity limit known for service {}; skipping capacity check",
                            service.service_id
                        );
                        None
                    }
                }
            }
        };

        // A send error only means nobody is listening right now.
        match update {
            StatusUpdate::Child(child) => {
                log::debug!(
                    "Child {} status {:?} -> {:?}",
                    child.child_id,
                    child.previous_status,
                    child.new_status
                );
                let _ = self.child_tx.send(child);
            }
            StatusUpdate::Service(service) => {
                log::debug!(
                    "Service {} capacity {} -> {}",
                    service.service_id,
                    service.previous_capacity,
                    service.new_capacity
                );
                let _ = self.service_tx.send(service);
            }
        }

        match notification {
            Some(notification) => {
                log::info!("Notification: {}", notification.title);
                let _ = self.notification_tx.send(notification);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Parses a MESSAGE frame body into a typed update.
pub fn parse_update(frame: &StompFrame) -> Result<StatusUpdate, DispatchError> {
    if !frame.is(commands::MESSAGE) {
        return Err(DispatchError::NotAMessage(frame.command.clone()));
    }
    let envelope: Envelope = serde_json::from_str(&frame.body)?;
    match envelope.kind.as_str() {
        KIND_CHILD_STATUS => Ok(StatusUpdate::Child(serde_json::from_value(envelope.payload)?)),
        KIND_SERVICE_STATUS => Ok(StatusUpdate::Service(serde_json::from_value(
            envelope.payload,
        )?)),
        other => Err(DispatchError::UnknownKind(other.to_string())),
    }
}

pub fn child_notification(update: &ChildStatusUpdate) -> StatusNotification {
    let message = match &update.service_id {
        Some(service_id) => format!(
            "Child {} is now {} at service {}.",
            update.child_id,
            update.new_status.label(),
            service_id
        ),
        None => format!("Child {} is now {}.", update.child_id, update.new_status.label()),
    };
    StatusNotification {
        kind: NotificationType::ChildStatusChanged,
        title: "Check-in status changed".to_string(),
        message,
        subject_id: update.child_id.clone(),
    }
}

/// Notification for a capacity threshold crossing, if one happened:
/// `ServiceFull` when the service just reached `max`, `ServiceAvailable`
/// when it just dropped below it.
pub fn capacity_notification(update: &ServiceStatusUpdate, max: u32) -> Option<StatusNotification> {
    let was_full = update.previous_capacity >= max;
    let is_full = update.new_capacity >= max;

    let (kind, title, message) = match (was_full, is_full) {
        (false, true) => (
            NotificationType::ServiceFull,
            "Service full",
            format!("Service {} has reached its capacity of {}.", update.service_id, max),
        ),
        (true, false) => (
            NotificationType::ServiceAvailable,
            "Service has space",
            format!(
                "Service {} has space again ({}/{}).",
                update.service_id, update.new_capacity, max
            ),
        ),
        _ => return None,
    };
    Some(StatusNotification {
        kind,
        title: title.to_string(),
        message,
        subject_id: update.service_id.clone(),
    })
}
