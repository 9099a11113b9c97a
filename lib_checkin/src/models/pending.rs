use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category of a write operation buffered while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingOperationType {
    RegisterChild,
    UpdateChild,
    CheckInChild,
    CheckOutChild,
    SyncData,
}

/// A caller-initiated write waiting for connectivity. The id is chosen by
/// the caller and must be unique within the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PendingOperationType,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl PendingOperation {
    /// Creates an operation stamped with the current time and no data.
    pub fn new(
        id: impl Into<String>,
        kind: PendingOperationType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            data: Map::new(),
            timestamp: Utc::now(),
            description: description.into(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
