//! Business Services
//!
//! - `DataService` - async boundary to the REST backend, plus an in-memory implementation
//! - `NodeCache` - client-side cache of fetched nodes
//! - `TreeController` - lazy loading, expansion, pagination and filtering
//! - `CrudController` - optimistic create/update/delete with rollback
//! - `EventBus` - broadcast of tree and operation events
//! - `Notifier` - user-facing notifications
//!
//! The controllers share one [`TreeView`](crate::view::TreeView) and talk to
//! each other only through the event bus.

pub mod crud_controller;
pub mod data_service;
pub mod error;
pub mod events;
pub mod memory_data_service;
pub mod node_cache;
pub mod notifier;
pub mod tree_controller;

pub use crud_controller::{CrudController, ItemSnapshot};
pub use data_service::{DataService, ListQuery};
pub use error::{RemoteError, RemoteErrorKind, TreeError};
pub use events::{EventBus, EventDetail, TreeEvent, UiEvent, EVENT_CHANNEL_CAPACITY};
pub use memory_data_service::{DataCall, Envelope, InMemoryDataService};
pub use node_cache::{CacheStats, CachedChildren, NodeCache};
pub use notifier::{Notification, Notifier, RecordingNotifier, Severity, TracingNotifier};
pub use tree_controller::{Pagination, TreeController};
