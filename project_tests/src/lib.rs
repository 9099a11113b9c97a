//! In-process STOMP-over-WebSocket server for driving the sync client in
//! integration tests.
//!
//! Every frame a client sends is recorded together with the index of the
//! connection it arrived on; EOL heartbeats are only counted. CONNECT is
//! answered with CONNECTED unless the server was started silent. Only the most recent
//! connection can be pushed to or closed; an older one is closed as soon as
//! a newer one is accepted.

use futures_util::{SinkExt, StreamExt};
use lib_checkin::protocol::{commands, decode, Inbound};
use lib_checkin::StompFrame;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

/// How long helpers wait for something to happen before failing the test.
pub const WAIT: Duration = Duration::from_secs(5);

enum ServerCommand {
    Send(String),
    Close,
}

/// A frame received by the server and the connection it came in on (0-based).
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: usize,
    pub frame: StompFrame,
}

pub struct MockStompServer {
    addr: SocketAddr,
    received_rx: mpsc::UnboundedReceiver<Received>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    connections: Arc<AtomicUsize>,
    heartbeats: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockStompServer {
    /// Starts a server that answers CONNECT with CONNECTED.
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Starts a server that accepts sockets but never answers CONNECT.
    pub async fn start_silent() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(reply_connected: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("mock server bind failed: {}", e));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("mock server has no address: {}", e));

        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));
        let heartbeats = Arc::new(AtomicUsize::new(0));

        let accept_task = tokio::spawn({
            let current = Arc::clone(&current);
            let connections = Arc::clone(&connections);
            let heartbeats = Arc::clone(&heartbeats);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let index = connections.fetch_add(1, Ordering::SeqCst);
                    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                    // Replacing the sender closes the previous connection
                    *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(cmd_tx);
                    tokio::spawn(serve_connection(
                        stream,
                        index,
                        reply_connected,
                        Arc::clone(&heartbeats),
                        received_tx.clone(),
                        cmd_rx,
                    ));
                }
            }
        });

        Self {
            addr,
            received_rx,
            current,
            connections,
            heartbeats,
            accept_task,
        }
    }

    /// HTTP base URL; the client derives `ws://.../ws` from it.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of sockets accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// EOL heartbeats received so far, over all connections.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` heartbeats have arrived.
    pub async fn wait_for_heartbeats(&self, count: usize) {
        let waited = tokio::time::timeout(WAIT, async {
            while self.heartbeats() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if waited.is_err() {
            panic!("only {} of {} heartbeats within {:?}", self.heartbeats(), count, WAIT);
        }
    }

    /// Next frame from any connection.
    pub async fn next_frame(&mut self) -> Received {
        match tokio::time::timeout(WAIT, self.received_rx.recv()).await {
            Ok(Some(received)) => received,
            Ok(None) => panic!("mock server stopped"),
            Err(_) => panic!("no frame received within {:?}", WAIT),
        }
    }

    /// Skips frames until one with `command` arrives.
    pub async fn wait_for(&mut self, command: &str) -> Received {
        loop {
            let received = self.next_frame().await;
            if received.frame.is(command) {
                return received;
            }
        }
    }

    /// Sends raw text to the most recent connection.
    pub fn send_text(&self, text: impl Into<String>) {
        self.command(ServerCommand::Send(text.into()));
    }

    /// Sends a MESSAGE frame with `body` on the user queue of `user_id`.
    pub fn send_message(&self, user_id: &str, body: &Value) {
        let frame = StompFrame::new(commands::MESSAGE)
            .header("destination", format!("/user/{}/queue/checkin-status", user_id))
            .header("content-type", "application/json")
            .with_body(body.to_string());
        self.send_text(frame.encode());
    }

    /// Closes the most recent connection from the server side.
    pub fn close_client(&self) {
        self.command(ServerCommand::Close);
    }

    fn command(&self, command: ServerCommand) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(tx) => {
                let _ = tx.send(command);
            }
            None => panic!("no client connected to the mock server"),
        }
    }
}

impl Drop for MockStompServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    stream: TcpStream,
    index: usize,
    reply_connected: bool,
    heartbeats: Arc<AtomicUsize>,
    received_tx: mpsc::UnboundedSender<Received>,
    mut cmd_rx: mpsc::UnboundedReceiver<ServerCommand>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ServerCommand::Send(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(ServerCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    return;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = match decode(text.as_str()) {
                        Ok(Inbound::Frame(frame)) => frame,
                        Ok(Inbound::Heartbeat) => {
                            heartbeats.fetch_add(1, Ordering::SeqCst);
                            continue;
                        }
                        Err(_) => continue,
                    };
                    if reply_connected && frame.is(commands::CONNECT) {
                        let connected = StompFrame::new(commands::CONNECTED)
                            .header("version", "1.2")
                            .header("heart-beat", "0,0");
                        if write.send(Message::Text(connected.encode().into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = received_tx.send(Received { connection: index, frame });
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// `{"type":"CHILD_STATUS","payload":{...}}` body for a child transition.
pub fn child_status_body(child_id: &str, previous: &str, new: &str, service_id: &str) -> Value {
    json!({
        "type": "CHILD_STATUS",
        "payload": {
            "childId": child_id,
            "previousStatus": previous,
            "newStatus": new,
            "serviceId": service_id,
            "timestamp": "1700000000000"
        }
    })
}

/// `{"type":"SERVICE_STATUS","payload":{...}}` body for a capacity change.
pub fn service_status_body(service_id: &str, previous: u32, new: u32, max: u32) -> Value {
    json!({
        "type": "SERVICE_STATUS",
        "payload": {
            "serviceId": service_id,
            "previousCapacity": previous,
            "newCapacity": new,
            "maxCapacity": max,
            "timestamp": "1700000000000"
        }
    })
}
