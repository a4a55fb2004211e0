//! CRUD Operation Tracking
//!
//! Bookkeeping for optimistic create/update/delete calls: registration,
//! timeouts with exponential backoff, terminal status and bounded history.
//! The optimistic UI itself lives in
//! [`CrudController`](crate::services::CrudController).

pub mod manager;

pub use manager::{OperationManager, OperationStats, OperationTicket};
