//! Typed status updates decoded from MESSAGE frames, and the notifications
//! derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check-in status of a child. Values the server adds later decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChildStatus {
    CheckedIn,
    CheckedOut,
    Registered,
    Absent,
    #[serde(other)]
    Unknown,
}

impl ChildStatus {
    /// Human-readable label used in notification text.
    pub fn label(&self) -> &'static str {
        match self {
            ChildStatus::CheckedIn => "checked in",
            ChildStatus::CheckedOut => "checked out",
            ChildStatus::Registered => "registered",
            ChildStatus::Absent => "absent",
            ChildStatus::Unknown => "in an unknown state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildStatusUpdate {
    pub child_id: String,
    #[serde(default)]
    pub previous_status: Option<ChildStatus>,
    pub new_status: ChildStatus,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(with = "epoch_millis")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusUpdate {
    pub service_id: String,
    pub previous_capacity: u32,
    pub new_capacity: u32,
    /// Capacity limit, when the server includes it in the payload.
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(with = "epoch_millis")]
    pub timestamp: DateTime<Utc>,
}

/// Either kind of update, as emitted on the update streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Child(ChildStatusUpdate),
    Service(ServiceStatusUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    ChildStatusChanged,
    ServiceFull,
    ServiceAvailable,
}

/// User-facing notification derived from an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    /// Child or service the notification is about.
    pub subject_id: String,
}

/// Timestamps travel as epoch-millisecond strings; bare numbers are accepted too.
pub(crate) mod epoch_millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.timestamp_millis().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        let millis = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.trim().parse::<i64>().map_err(de::Error::custom)?,
            Raw::Number(n) => n,
        };
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis)))
    }
}
