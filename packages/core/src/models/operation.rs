//! Pending CRUD operation records
//!
//! A [`PendingOperation`] is the bookkeeping entry for one in-flight create,
//! update or delete. It is owned by the
//! [`OperationManager`](crate::operations::OperationManager); these types are
//! the serializable view of it that shows up in events and stats.

use crate::models::{NodeId, NodeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of CRUD action an operation tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status; everything except `Pending` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Success,
    Error,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

/// Operation identifier: `<kind>-<type>-<timestamp_ms>-<seq>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(kind: OperationKind, target_type: NodeType, timestamp_ms: i64, seq: u64) -> Self {
        Self(format!("{}-{}-{}-{}", kind, target_type, timestamp_ms, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bookkeeping record for one CRUD call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<NodeId>,
    pub status: OperationStatus,
    /// Number of attempts so far, starting at 1
    pub attempts: u32,
    /// Deadline of the first attempt
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingOperation {
    /// Wall-clock duration, if the operation has finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_id_format() {
        let id = OperationId::new(OperationKind::Delete, NodeType::Location, 1_700_000_000_000, 3);
        assert_eq!(id.as_str(), "delete-location-1700000000000-3");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Success.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_pending_operation_serialization() {
        let start = Utc::now();
        let op = PendingOperation {
            id: OperationId::new(OperationKind::Create, NodeType::Project, 1, 0),
            kind: OperationKind::Create,
            target_type: NodeType::Project,
            target_id: None,
            status: OperationStatus::Pending,
            attempts: 1,
            timeout: Duration::from_secs(60),
            start_time: start,
            end_time: None,
            error: None,
        };

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["id"], json!("create-project-1-0"));
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["timeout"], json!(60_000));
        assert!(value.get("endTime").is_none());
        assert!(op.elapsed().is_none());
    }
}
