use std::fmt;

/// Lifecycle state of the one physical connection. Exactly one is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff delay before reconnect attempt `attempt`.
    Reconnecting { attempt: u32, max_attempts: u32 },
    Error { message: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt, max_attempts } => {
                write!(f, "reconnecting ({}/{})", attempt, max_attempts)
            }
            ConnectionState::Error { message } => write!(f, "error: {}", message),
        }
    }
}
