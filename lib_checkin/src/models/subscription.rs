use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of subject a caller can monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Child,
    Service,
}

impl SubjectType {
    /// Value used in the `subject-type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Child => "child",
            SubjectType::Service => "service",
        }
    }
}

/// A subject the caller wants notifications for. Unique by (type, id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subject_type: SubjectType,
    pub subject_id: String,
}

impl Subscription {
    pub fn new(subject_type: SubjectType, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type,
            subject_id: subject_id.into(),
        }
    }

    pub fn child(child_id: impl Into<String>) -> Self {
        Self::new(SubjectType::Child, child_id)
    }

    pub fn service(service_id: impl Into<String>) -> Self {
        Self::new(SubjectType::Service, service_id)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type.as_str(), self.subject_id)
    }
}
