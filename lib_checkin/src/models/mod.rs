//! # Data Model
//!
//! Value types shared by every component: connection state, subscriptions,
//! status updates and notifications, pending operations and the offline
//! capability table.

pub mod connection_state;
pub mod offline;
pub mod pending;
pub mod status;
pub mod subscription;

pub use connection_state::ConnectionState;
pub use offline::{OfflineCapabilities, OfflineOperation};
pub use pending::{PendingOperation, PendingOperationType};
pub use status::{
    ChildStatus, ChildStatusUpdate, NotificationType, ServiceStatusUpdate, StatusNotification,
    StatusUpdate,
};
pub use subscription::{SubjectType, Subscription};
