//! # Error Taxonomy
//!
//! Three families of errors exist in the sync subsystem:
//!
//! - [`SyncError`]: returned to callers of the public API. Transport failures
//!   that the reconnect state machine recovers from never reach the caller as
//!   a `SyncError`; they surface as `ConnectionState::Error` instead.
//! - [`FrameError`]: produced by the frame codec for malformed wire text.
//! - [`DispatchError`]: produced when a decoded frame cannot be turned into a
//!   typed status update.
//!
//! Codec and dispatch errors are logged and the offending frame is dropped by
//! the read loop; they never terminate a connection.

use thiserror::Error;

/// Convenience alias used across the crate's public API.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced to callers of the sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    /// `close()` was called; the instance cannot be reused.
    #[error("sync client has been closed")]
    Closed,

    /// The outbound frame could not be handed to the socket writer.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Transport-level failure reported by tungstenite.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The configured base URL could not be turned into a socket URL.
    #[error("invalid base url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The CONNECT exchange did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A pending operation with the same id is already queued.
    #[error("pending operation '{0}' is already queued")]
    DuplicateOperation(String),

    /// Configuration values that cannot work together.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors produced while decoding wire text into a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has no blank line separating headers from body")]
    MissingSeparator,

    #[error("frame has an empty command line")]
    EmptyCommand,

    #[error("malformed header line: '{0}'")]
    MalformedHeader(String),

    #[error("invalid content-length header: '{0}'")]
    InvalidContentLength(String),
}

/// Errors produced while turning a decoded frame into a status update.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload discriminator names a message type this client does not know.
    #[error("unknown payload kind '{0}'")]
    UnknownKind(String),

    #[error("invalid payload json: {0}")]
    Json(#[from] serde_json::Error),

    /// Only MESSAGE frames carry status updates.
    #[error("frame command '{0}' does not carry a status update")]
    NotAMessage(String),
}
