//! Dashboard application root
//!
//! Builds every collaborator once and hands them to the controllers, so
//! nothing in the crate is a process-wide singleton. UI interactions come in
//! as typed [`UiAction`]s through [`Dashboard::dispatch`].

use crate::behaviors::NodeTypeRegistry;
use crate::config::DashboardConfig;
use crate::models::{ItemKey, Node, NodeId, NodeType};
use crate::operations::{OperationManager, OperationStats};
use crate::services::{
    CrudController, DataService, EventBus, Notifier, TracingNotifier, TreeController, TreeError,
    UiEvent,
};
use crate::state::ObservableStore;
use crate::view::{DefaultRenderer, NodeRenderer, TreeView};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A user interaction on the tree
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Toggle(ItemKey),
    Expand(ItemKey),
    Collapse(ItemKey),
    LoadMore,
    /// The infinite-scroll sentinel entered the viewport
    SentinelVisible,
    /// Filter input changed (debounced)
    Filter(String),
    Refresh,
    Add {
        node_type: NodeType,
        fields: Vec<String>,
        parent_id: Option<NodeId>,
        values: Map<String, Value>,
    },
    Update {
        node_type: NodeType,
        id: NodeId,
        partial: Map<String, Value>,
    },
    Delete {
        node_type: NodeType,
        id: NodeId,
    },
}

/// Result of a dispatched action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Done,
    /// Number of items rendered
    Loaded(usize),
    Created(Node),
    Updated(Node),
}

pub struct Dashboard {
    config: DashboardConfig,
    store: Arc<ObservableStore>,
    events: EventBus,
    view: Arc<TreeView>,
    tree: Arc<TreeController>,
    crud: CrudController,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    /// Dashboard with the standard renderer, logging notifications
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(data: Arc<dyn DataService>, config: DashboardConfig) -> Self {
        Self::with_parts(
            data,
            config,
            Arc::new(TracingNotifier),
            Arc::new(DefaultRenderer),
        )
    }

    /// Dashboard with explicit notifier and renderer
    pub fn with_parts(
        data: Arc<dyn DataService>,
        config: DashboardConfig,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn NodeRenderer>,
    ) -> Self {
        let store = Arc::new(ObservableStore::initialized());
        let registry = Arc::new(NodeTypeRegistry::default());
        let events = EventBus::new();
        let view = Arc::new(TreeView::new(renderer));
        let operations = Arc::new(OperationManager::new(
            events.clone(),
            notifier.clone(),
            config.max_attempts,
            config.history_limit,
        ));

        let tree = Arc::new(TreeController::new(
            data.clone(),
            registry.clone(),
            store.clone(),
            view.clone(),
            events.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let crud = CrudController::new(
            data,
            registry,
            view.clone(),
            events.clone(),
            notifier,
            operations,
            config.clone(),
        );
        let listener = tree.listen(events.subscribe());

        tracing::debug!("Dashboard initialised (page size {})", config.page_size);
        Self {
            config,
            store,
            events,
            view,
            tree,
            crud,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObservableStore> {
        &self.store
    }

    pub fn view(&self) -> &Arc<TreeView> {
        &self.view
    }

    pub fn tree(&self) -> &Arc<TreeController> {
        &self.tree
    }

    pub fn crud(&self) -> &CrudController {
        &self.crud
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn operation_stats(&self) -> OperationStats {
        self.crud.operation_stats()
    }

    /// Render the first page of root nodes
    pub async fn start(&self) -> Result<usize, TreeError> {
        self.tree.refresh_tree(None).await
    }

    /// Route a UI action to the controller that owns it
    pub async fn dispatch(&self, action: UiAction) -> Result<ActionOutcome, TreeError> {
        tracing::trace!("Dispatching {:?}", action);
        match action {
            UiAction::Toggle(key) => self.tree.toggle_node(&key).await.map(|_| ActionOutcome::Done),
            UiAction::Expand(key) => self.tree.expand_node(&key).await.map(|_| ActionOutcome::Done),
            UiAction::Collapse(key) => {
                self.tree.collapse_node(&key).await.map(|_| ActionOutcome::Done)
            }
            UiAction::LoadMore => self.tree.load_more().await.map(ActionOutcome::Loaded),
            UiAction::SentinelVisible => self
                .tree
                .on_sentinel_intersect()
                .await
                .map(ActionOutcome::Loaded),
            UiAction::Filter(text) => {
                self.tree.set_filter(text);
                Ok(ActionOutcome::Done)
            }
            UiAction::Refresh => {
                let filter = self.tree.pagination().filter;
                self.tree.refresh_tree(filter).await.map(ActionOutcome::Loaded)
            }
            UiAction::Add {
                node_type,
                fields,
                parent_id,
                values,
            } => {
                let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                self.crud
                    .add_item(node_type, &fields, parent_id, values)
                    .await
                    .map(ActionOutcome::Created)
            }
            UiAction::Update {
                node_type,
                id,
                partial,
            } => self
                .crud
                .update_item(node_type, &id, partial)
                .await
                .map(ActionOutcome::Updated),
            UiAction::Delete { node_type, id } => self
                .crud
                .delete_item(node_type, &id)
                .await
                .map(|_| ActionOutcome::Done),
        }
    }

    /// Cancel pending operations and tear everything down
    pub fn shutdown(&self) {
        self.crud.operations().teardown();
        self.tree.destroy();
        self.store.teardown();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
        tracing::info!("Dashboard shut down");
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
    }
}
