//! Fieldtree Core
//!
//! Headless core of the field-data dashboard: a lazy-loading tree of
//! Projects → Locations → Measurements backed by a REST service, with a
//! client-side node cache and optimistic CRUD that rolls back on failure.
//!
//! # Architecture
//!
//! - **Typed state**: expansion/load state lives in an observable store and
//!   only changes through reducers
//! - **Tri-state cache**: a lookup tells "never fetched" from "fetched, empty"
//! - **Pure rendering**: items are re-rendered from data, so rollback is a
//!   re-render of the pre-mutation snapshot
//! - **Events, not calls**: the CRUD controller informs the tree through the
//!   event bus
//!
//! # Modules
//!
//! - [`models`] - Nodes, list envelopes, pending operations
//! - [`behaviors`] - Node type registry (hierarchy wiring, required fields)
//! - [`state`] - Observable store and tree state
//! - [`view`] - Renderer and rendered document
//! - [`services`] - Data service, cache, tree and CRUD controllers, events
//! - [`operations`] - Operation tracking with timeout retry
//! - [`app`] - `Dashboard` root and typed UI actions

pub mod app;
pub mod behaviors;
pub mod config;
pub mod models;
pub mod operations;
pub mod services;
pub mod state;
pub mod view;

// Re-export commonly used types
pub use app::{ActionOutcome, Dashboard, UiAction};
pub use behaviors::*;
pub use config::DashboardConfig;
pub use models::*;
pub use operations::{OperationManager, OperationStats, OperationTicket};
pub use services::*;
pub use state::*;
pub use view::*;
