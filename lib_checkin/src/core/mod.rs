//! # Core Sync Engine
//!
//! The moving parts behind the client facade:
//!
//! - **`connection_manager`**: owns the WebSocket, the CONNECT handshake, the
//!   read loop and the reconnect state machine.
//! - **`registry`**: the set of subjects the caller wants updates for. It
//!   survives reconnects and is replayed onto every new connection.
//! - **`dispatcher`**: turns inbound MESSAGE frames into typed updates and
//!   derived notifications, fanned out on broadcast streams.
//! - **`backoff`**: the reconnect delay curve and attempt limit.

/// Exponential reconnect delays and the attempt limit.
pub mod backoff;
/// Connection lifecycle, handshake, read loop and reconnection.
pub mod connection_manager;
/// Frame to update/notification fan-out.
pub mod dispatcher;
/// Subscription bookkeeping and replay.
pub mod registry;

pub use backoff::{reconnect_delay, ReconnectPolicy};
pub use connection_manager::ConnectionManager;
pub use dispatcher::{Handled, StatusDispatcher};
pub use registry::SubscriptionRegistry;
