//! Data Models
//!
//! This module contains the data structures shared by every layer:
//!
//! - `Node` - one project, location or measurement
//! - `NodePage` - a list response after envelope normalization
//! - `PendingOperation` - bookkeeping for in-flight CRUD calls

mod envelope;
mod node;
mod operation;

pub use envelope::NodePage;
pub use node::{ItemKey, Node, NodeId, NodeRecord, NodeType, ValidationError};
pub use operation::{OperationId, OperationKind, OperationStatus, PendingOperation};
