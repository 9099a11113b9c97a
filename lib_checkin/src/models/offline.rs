//! Operation categories and the policy table deciding which of them may be
//! attempted without connectivity.

use serde::{Deserialize, Serialize};

/// Operation categories the UI layer asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflineOperation {
    ViewChildren,
    ViewServices,
    ViewEvents,
    ViewPosts,
    CheckIn,
    CheckOut,
    RegisterChild,
    EditChild,
    SyncData,
}

/// What the app may do in the current connectivity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCapabilities {
    pub can_view_children: bool,
    pub can_view_services: bool,
    pub can_view_events: bool,
    pub can_view_posts: bool,
    pub can_check_in: bool,
    pub can_check_out: bool,
    pub can_register_child: bool,
    pub can_edit_child: bool,
    pub can_sync_data: bool,
}

impl Default for OfflineCapabilities {
    /// Online: everything is allowed.
    fn default() -> Self {
        Self {
            can_view_children: true,
            can_view_services: true,
            can_view_events: true,
            can_view_posts: true,
            can_check_in: true,
            can_check_out: true,
            can_register_child: true,
            can_edit_child: true,
            can_sync_data: true,
        }
    }
}

impl OfflineCapabilities {
    /// Offline policy: cached views only. Attendance changes need a confirmed
    /// round trip, so check-in, check-out, registration and edits are refused.
    pub fn offline() -> Self {
        Self {
            can_view_children: true,
            can_view_services: true,
            can_view_events: true,
            can_view_posts: true,
            can_check_in: false,
            can_check_out: false,
            can_register_child: false,
            can_edit_child: false,
            can_sync_data: false,
        }
    }

    pub fn for_status(offline: bool) -> Self {
        if offline {
            Self::offline()
        } else {
            Self::default()
        }
    }

    pub fn allows(&self, operation: OfflineOperation) -> bool {
        match operation {
            OfflineOperation::ViewChildren => self.can_view_children,
            OfflineOperation::ViewServices => self.can_view_services,
            OfflineOperation::ViewEvents => self.can_view_events,
            OfflineOperation::ViewPosts => self.can_view_posts,
            OfflineOperation::CheckIn => self.can_check_in,
            OfflineOperation::CheckOut => self.can_check_out,
            OfflineOperation::RegisterChild => self.can_register_child,
            OfflineOperation::EditChild => self.can_edit_child,
            OfflineOperation::SyncData => self.can_sync_data,
        }
    }
}

impl OfflineOperation {
    /// User-facing text explaining how the operation behaves without a connection.
    pub fn offline_message(&self) -> &'static str {
        match self {
            OfflineOperation::ViewChildren => "Showing saved children. The list may be out of date until you reconnect.",
            OfflineOperation::ViewServices => "Showing saved services. Capacity may be out of date until you reconnect.",
            OfflineOperation::ViewEvents => "Showing saved events. New events will appear when you reconnect.",
            OfflineOperation::ViewPosts => "Showing saved posts. New posts will appear when you reconnect.",
            OfflineOperation::CheckIn => "Check-in requires an internet connection so the child's attendance can be confirmed.",
            OfflineOperation::CheckOut => "Check-out requires an internet connection so the child's attendance can be confirmed.",
            OfflineOperation::RegisterChild => "Registering a child requires an internet connection.",
            OfflineOperation::EditChild => "Editing a child's details requires an internet connection.",
            OfflineOperation::SyncData => "Data will sync automatically once you are back online.",
        }
    }
}
