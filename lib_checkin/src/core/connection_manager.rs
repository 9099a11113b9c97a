//! # Connection Manager
//!
//! Owns the one physical WebSocket connection and its lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Error -> Reconnecting{n} -> Connecting -> ...
//! ```
//!
//! Each `connect()` spawns one session task. The task opens the socket, sends
//! CONNECT, waits for the first inbound frame, replays the registry's
//! subscriptions and only then reports `Connected`. It then runs the read
//! loop until the socket fails, sleeps out the backoff delay and tries again,
//! up to `max_reconnect_attempts` consecutive failures. The read loop and the
//! backoff sleep never run at the same time.
//!
//! `disconnect()` cancels the session (read loop or pending backoff sleep)
//! and keeps registry state. `close()` also cancels the root token, after
//! which the manager refuses new connections.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, Interval};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::configs::SyncConfig;
use crate::core::backoff::ReconnectPolicy;
use crate::core::dispatcher::{Handled, StatusDispatcher};
use crate::core::registry::SubscriptionRegistry;
use crate::error::{Result, SyncError};
use crate::models::ConnectionState;
use crate::protocol::{self, StompFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `disconnect()` waits for the session task to say goodbye.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// State shared between the public handle and the session task.
struct Shared {
    inner: Mutex<SharedInner>,
    state_tx: broadcast::Sender<ConnectionState>,
}

struct SharedInner {
    state: ConnectionState,
    auth_token: Option<String>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    fn auth_token(&self) -> Option<String> {
        self.lock().auth_token.clone()
    }

    /// Stores and broadcasts a transition. Repeating the current state is a no-op.
    fn set_state(&self, next: ConnectionState) {
        let mut inner = self.lock();
        if inner.state == next {
            return;
        }
        log::info!("Connection state: {} -> {}", inner.state, next);
        inner.state = next.clone();
        // Emit under the lock so observers see transitions in order.
        let _ = self.state_tx.send(next);
    }
}

struct Session {
    user_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ConnectionManager {
    config: Arc<SyncConfig>,
    policy: ReconnectPolicy,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<StatusDispatcher>,
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
    root: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<SyncConfig>,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<StatusDispatcher>,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(config.event_buffer_size.max(1));
        let shared = Arc::new(Shared {
            inner: Mutex::new(SharedInner {
                state: ConnectionState::Disconnected,
                auth_token: config.auth_token.clone(),
            }),
            state_tx,
        });
        Self {
            policy: ReconnectPolicy::from_config(&config),
            config,
            registry,
            dispatcher,
            shared,
            session: tokio::sync::Mutex::new(None),
            root: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Receiver of future state transitions (no replay of the current one).
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Replaces the bearer token used by the next handshake.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.shared.lock().auth_token = token;
    }

    /// User id of the current session, if one is running.
    pub async fn current_user(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.user_id.clone())
    }

    /// Starts a session for `user_id`, tearing down any previous session first.
    ///
    /// Returns once the session task is running; progress is reported on the
    /// state stream.
    pub async fn connect(&self, user_id: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let ws_url = self.config.ws_url()?;

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            log::info!("Replacing session for user {}", previous.user_id);
            self.stop_session(previous).await;
        }

        self.shared.set_state(ConnectionState::Connecting);
        let cancel = self.root.child_token();
        let task = SessionTask {
            ws_url,
            user_id: user_id.to_string(),
            config: Arc::clone(&self.config),
            policy: self.policy,
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        *session = Some(Session {
            user_id: user_id.to_string(),
            cancel,
            handle,
        });
        Ok(())
    }

    /// Stops the current connection and any scheduled reconnection.
    /// Subscriptions stay registered for the next `connect()`.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            log::info!("Disconnecting user {}", current.user_id);
            self.stop_session(current).await;
        }
        self.registry.detach();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Disconnects and releases every background resource. Irreversible.
    pub async fn close(&self) {
        self.disconnect().await;
        self.root.cancel();
        log::info!("Connection manager closed");
    }

    async fn stop_session(&self, session: Session) {
        session.cancel.cancel();
        let mut handle = session.handle;
        if timeout(STOP_GRACE, &mut handle).await.is_err() {
            log::warn!("Session task did not stop within {:?}; aborting it", STOP_GRACE);
            handle.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Session tokens are children of root, so this stops any running task.
        self.root.cancel();
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Failed(String),
}

struct SessionTask {
    ws_url: String,
    user_id: String,
    config: Arc<SyncConfig>,
    policy: ReconnectPolicy,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<StatusDispatcher>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            self.shared.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return,
                opened = self.establish() => opened,
            };

            let reason = match opened {
                Ok(ws) => {
                    let (reached_connected, end) = self.serve(ws).await;
                    if reached_connected {
                        failures = 0;
                    }
                    match end {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Failed(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            log::warn!("Connection to {} lost: {}", self.ws_url, reason);
            self.shared.set_state(ConnectionState::Error {
                message: reason.clone(),
            });

            if !self.policy.should_retry(failures) {
                log::error!(
                    "Giving up after {} reconnect attempt(s); call connect() to try again",
                    failures
                );
                self.shared.set_state(ConnectionState::Error {
                    message: format!(
                        "reconnect attempts exhausted ({}): {}",
                        self.policy.max_attempts, reason
                    ),
                });
                return;
            }

            failures += 1;
            let delay = self.policy.delay(failures);
            self.shared.set_state(ConnectionState::Reconnecting {
                attempt: failures,
                max_attempts: self.policy.max_attempts,
            });
            log::info!(
                "Reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                failures,
                self.policy.max_attempts
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Socket open + CONNECT + first inbound frame, bounded by the connect timeout.
    async fn establish(&self) -> Result<WsStream> {
        let budget = self.config.connect_timeout();
        timeout(budget, self.open_and_handshake())
            .await
            .map_err(|_| SyncError::Handshake(format!("timed out after {}ms", budget.as_millis())))?
    }

    async fn open_and_handshake(&self) -> Result<WsStream> {
        log::info!("Connecting to {}", self.ws_url);
        let (mut ws, _) = connect_async(self.ws_url.as_str()).await?;

        let token = self.shared.auth_token();
        if token.is_none() {
            log::warn!("Connecting without a bearer token");
        }
        let connect = protocol::connect_frame(
            token.as_deref(),
            self.config.heartbeat_outgoing_ms,
            self.config.heartbeat_incoming_ms,
        );
        ws.send(WsMessage::Text(connect.encode().into())).await?;

        // Any frame back means the channel is usable; its content goes through
        // the dispatcher like every other frame.
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if self.dispatcher.handle_text(text.as_str()) != Handled::Heartbeat {
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(bin))) => {
                    if self.handle_binary(&bin) != Handled::Heartbeat {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(close))) => {
                    let reason = close
                        .map(|c| format!("{} {}", c.code, c.reason.as_str()))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(SyncError::Handshake(format!("closed during handshake: {}", reason)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(SyncError::Handshake("stream ended during handshake".to_string())),
            }
        }
        log::info!("Handshake with {} complete", self.ws_url);
        Ok(ws)
    }

    /// Replays subscriptions, reports `Connected` and runs the read loop.
    /// The flag tells whether `Connected` was reached.
    async fn serve(&self, ws: WsStream) -> (bool, SessionEnd) {
        let (mut write, mut read): (SplitSink<WsStream, WsMessage>, SplitStream<WsStream>) =
            ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<StompFrame>();

        let replay = self.registry.on_reconnected(&self.user_id, out_tx);
        let replayed = replay.len();
        for frame in replay {
            if let Err(e) = write.send(WsMessage::Text(frame.encode().into())).await {
                self.registry.detach();
                return (false, SessionEnd::Failed(format!("subscription replay failed: {}", e)));
            }
        }
        if replayed > 0 {
            log::info!("Replayed {} subscription(s) for user {}", replayed, self.user_id);
        }
        self.shared.set_state(ConnectionState::Connected);

        let end = self.read_loop(&mut write, &mut read, &mut out_rx).await;
        self.registry.detach();
        (true, end)
    }

    async fn read_loop(
        &self,
        write: &mut SplitSink<WsStream, WsMessage>,
        read: &mut SplitStream<WsStream>,
        out_rx: &mut mpsc::UnboundedReceiver<StompFrame>,
    ) -> SessionEnd {
        let mut heartbeat = self.config.heartbeat_outgoing().map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });
        let silence_limit = self.config.heartbeat_timeout();
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let goodbye = protocol::disconnect_frame().encode();
                    let _ = write.send(WsMessage::Text(goodbye.into())).await;
                    let _ = write.close().await;
                    return SessionEnd::Cancelled;
                }
                Some(frame) = out_rx.recv() => {
                    log::debug!("Sending {}", frame);
                    if let Err(e) = write.send(WsMessage::Text(frame.encode().into())).await {
                        return SessionEnd::Failed(format!("write failed: {}", e));
                    }
                }
                _ = tick(&mut heartbeat) => {
                    if let Err(e) = write.send(WsMessage::Text("\n".into())).await {
                        return SessionEnd::Failed(format!("heartbeat write failed: {}", e));
                    }
                }
                _ = silence(last_inbound, silence_limit) => {
                    return SessionEnd::Failed(format!(
                        "no inbound traffic for {}ms",
                        self.config.heartbeat_timeout_ms
                    ));
                }
                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_inbound = Instant::now();
                        self.dispatcher.handle_text(text.as_str());
                    }
                    Some(Ok(WsMessage::Binary(bin))) => {
                        last_inbound = Instant::now();
                        self.handle_binary(&bin);
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(WsMessage::Close(close))) => {
                        let reason = close
                            .map(|c| format!("{} {}", c.code, c.reason.as_str()))
                            .unwrap_or_else(|| "no close frame".to_string());
                        return SessionEnd::Failed(format!("closed by server: {}", reason));
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => return SessionEnd::Failed(format!("read failed: {}", e)),
                    None => return SessionEnd::Failed("stream ended".to_string()),
                }
            }
        }
    }

    fn handle_binary(&self, bin: &[u8]) -> Handled {
        match std::str::from_utf8(bin) {
            Ok(text) => self.dispatcher.handle_text(text),
            Err(_) => {
                log::warn!("Dropping non-UTF-8 binary message ({} bytes)", bin.len());
                Handled::Dropped
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn silence(last_inbound: Instant, limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep_until(last_inbound + limit).await,
        None => std::future::pending().await,
    }
}
