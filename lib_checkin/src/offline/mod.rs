//! # Offline Operation Queue
//!
//! Device-level connectivity flag, the capability table derived from it and
//! the ordered list of writes waiting for the network. Independent of the
//! WebSocket's own connection state.

pub mod queue;

pub use queue::OfflineQueue;
