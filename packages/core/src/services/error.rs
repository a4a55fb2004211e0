//! Service Layer Error Types
//!
//! This module defines the error taxonomy shared by the tree and CRUD
//! controllers:
//!
//! - `ValidationError` - bad caller input (re-exported from models)
//! - `NotFound` - target item or cache entry missing
//! - `RemoteError` - data service rejection, classified by status
//! - `Timeout` - an operation exceeded its deadline after all attempts

use crate::models::{ItemKey, OperationId, ValidationError};
use crate::state::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteErrorKind {
    Validation,
    Permission,
    NotFound,
    Server,
    Network,
    /// The payload did not match any accepted response shape
    InvalidResponse,
    Unknown,
}

impl RemoteErrorKind {
    /// Classify an HTTP-like status; `None` means the request never got an answer
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            None => RemoteErrorKind::Network,
            Some(400) | Some(422) => RemoteErrorKind::Validation,
            Some(401) | Some(403) => RemoteErrorKind::Permission,
            Some(404) => RemoteErrorKind::NotFound,
            Some(500..=599) => RemoteErrorKind::Server,
            Some(_) => RemoteErrorKind::Unknown,
        }
    }
}

/// Rejection from the data service
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Remote {kind:?} error{}: {message}", status_suffix(.status))]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl RemoteError {
    /// Create an error from an HTTP-like status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::from_status(Some(status)),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a network error (no response received)
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    /// Create an error for a payload in an unrecognised shape
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::InvalidResponse,
            status: None,
            message: message.into(),
        }
    }

    /// Network and server failures are worth offering a retry for
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::Network | RemoteErrorKind::Server)
    }
}

/// Errors surfaced by the tree and CRUD controllers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// Caller input rejected before anything was mutated
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Target item is not rendered or not cached
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The data service rejected the call
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// The operation did not finish within its deadline after all attempts
    #[error("Operation '{operation_id}' timed out after {attempts} attempt(s)")]
    Timeout {
        operation_id: OperationId,
        attempts: u32,
    },

    /// The operation was cancelled before it finished
    #[error("Operation '{operation_id}' was cancelled")]
    Cancelled { operation_id: OperationId },

    /// A node could not be rendered
    #[error("Failed to render {key}: {reason}")]
    Render { key: ItemKey, reason: String },

    /// State store rejected the write
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

impl TreeError {
    /// Create a NotFound error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a NotFound error for a tree item
    pub fn item_not_found(key: &ItemKey) -> Self {
        Self::NotFound {
            what: format!("item {}", key),
        }
    }

    /// Create a Render error
    pub fn render(key: ItemKey, reason: impl Into<String>) -> Self {
        Self::Render {
            key,
            reason: reason.into(),
        }
    }

    /// Whether the surrounding UI should offer a retry affordance
    pub fn is_retryable(&self) -> bool {
        match self {
            TreeError::Remote(remote) => remote.is_retryable(),
            TreeError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    #[test]
    fn test_status_classification() {
        assert_eq!(RemoteErrorKind::from_status(None), RemoteErrorKind::Network);
        assert_eq!(RemoteErrorKind::from_status(Some(400)), RemoteErrorKind::Validation);
        assert_eq!(RemoteErrorKind::from_status(Some(422)), RemoteErrorKind::Validation);
        assert_eq!(RemoteErrorKind::from_status(Some(401)), RemoteErrorKind::Permission);
        assert_eq!(RemoteErrorKind::from_status(Some(403)), RemoteErrorKind::Permission);
        assert_eq!(RemoteErrorKind::from_status(Some(404)), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_status(Some(503)), RemoteErrorKind::Server);
        assert_eq!(RemoteErrorKind::from_status(Some(302)), RemoteErrorKind::Unknown);
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::from_status(404, "project gone");
        assert_eq!(format!("{}", err), "Remote NotFound error (404): project gone");

        let err = RemoteError::network("connection reset");
        assert_eq!(format!("{}", err), "Remote Network error: connection reset");
    }

    #[test]
    fn test_retryability() {
        assert!(TreeError::from(RemoteError::network("offline")).is_retryable());
        assert!(TreeError::from(RemoteError::from_status(502, "bad gateway")).is_retryable());
        assert!(!TreeError::from(RemoteError::from_status(403, "nope")).is_retryable());
        assert!(!TreeError::from(ValidationError::MissingField("name".into())).is_retryable());
    }

    #[test]
    fn test_item_not_found_message() {
        let err = TreeError::item_not_found(&ItemKey::new(NodeType::Location, "l9"));
        assert_eq!(format!("{}", err), "Not found: item location:l9");
    }
}
