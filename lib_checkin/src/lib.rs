//! Real-time check-in status synchronization.
//!
//! A STOMP-over-WebSocket client that keeps an app informed of child
//! check-in/check-out changes and service capacity, survives network loss
//! through reconnection with backoff, and buffers writes while the device is
//! offline. Start with [`CheckinSyncClient`].

#![forbid(unsafe_code)]

pub mod client;
pub mod configs;
pub mod core;
pub mod error;
pub mod models;
pub mod offline;
pub mod protocol;

// Re-export the caller-facing surface
pub use client::CheckinSyncClient;
pub use configs::SyncConfig;
pub use error::{DispatchError, FrameError, Result, SyncError};
pub use models::{
    ChildStatus, ChildStatusUpdate, ConnectionState, NotificationType, OfflineCapabilities,
    OfflineOperation, PendingOperation, PendingOperationType, ServiceStatusUpdate,
    StatusNotification, StatusUpdate, SubjectType, Subscription,
};
pub use offline::OfflineQueue;
pub use protocol::StompFrame;
