//! Optimistic CRUD controller
//!
//! Every mutation is applied to the rendered tree before the backend
//! confirms it, tracked by the [`OperationManager`], and rolled back when
//! the backend rejects it or the operation times out:
//!
//! | Action | Optimistic change             | Rollback                          |
//! |--------|-------------------------------|-----------------------------------|
//! | add    | pending placeholder inserted  | placeholder removed               |
//! | update | patch applied and re-rendered | re-rendered from the data snapshot|
//! | delete | item faded and removed        | subtree reinserted at its position|
//!
//! The controller never touches the tree cache directly. Confirmed changes
//! are published as events that the
//! [`TreeController`](crate::services::TreeController) consumes.

use crate::behaviors::NodeTypeRegistry;
use crate::config::DashboardConfig;
use crate::models::{
    ItemKey, Node, NodeId, NodeType, OperationKind, OperationStatus, ValidationError,
};
use crate::operations::{OperationManager, OperationStats, OperationTicket};
use crate::services::data_service::DataService;
use crate::services::error::{RemoteError, TreeError};
use crate::services::events::{EventBus, TreeEvent};
use crate::services::notifier::{Notification, Notifier};
use crate::view::{NodePhase, RenderState, TreeView};
use chrono::Utc;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Pre-mutation copy of an item's data and UI state
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub node: Node,
    pub state: RenderState,
}

pub struct CrudController {
    data: Arc<dyn DataService>,
    registry: Arc<NodeTypeRegistry>,
    view: Arc<TreeView>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    operations: Arc<OperationManager>,
    config: DashboardConfig,
}

impl CrudController {
    pub fn new(
        data: Arc<dyn DataService>,
        registry: Arc<NodeTypeRegistry>,
        view: Arc<TreeView>,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
        operations: Arc<OperationManager>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            data,
            registry,
            view,
            events,
            notifier,
            operations,
            config,
        }
    }

    pub fn operations(&self) -> &Arc<OperationManager> {
        &self.operations
    }

    pub fn operation_stats(&self) -> OperationStats {
        self.operations.stats()
    }

    /// Create a node under `parent_id`, showing a placeholder until confirmed
    ///
    /// `fields` are the fields opened for editing and must cover the type's
    /// required fields; `values` carries their contents.
    pub async fn add_item(
        &self,
        node_type: NodeType,
        fields: &[&str],
        parent_id: Option<NodeId>,
        values: Map<String, Value>,
    ) -> Result<Node, TreeError> {
        let parent = match self.validate_add(node_type, fields, parent_id.as_ref()) {
            Ok(parent) => parent,
            Err(err) => return Err(self.reject(err)),
        };

        let mut ticket = self.operations.start_operation(
            OperationKind::Create,
            node_type,
            None,
            self.config.timeout_for(OperationKind::Create),
        );

        // a collapsed parent picks the new node up on its next expansion
        let placeholder_key = if self.children_visible(parent.as_ref()) {
            let inserted = self.insert_placeholder(
                node_type,
                fields,
                parent.as_ref(),
                parent_id.clone(),
                &values,
            );
            match inserted {
                Ok(key) => Some(key),
                Err(err) => return Err(self.fail(&ticket, err)),
            }
        } else {
            tracing::debug!("Parent of new {} is collapsed; not rendering it", node_type);
            None
        };

        let payload = self.create_payload(node_type, parent_id.as_ref(), values);
        let result = self
            .race(&mut ticket, self.data.create(node_type, payload))
            .await
            .and_then(|record| {
                Node::from_record(record, node_type, parent_id.as_ref()).map_err(TreeError::from)
            });

        let node = match result {
            Ok(node) => node,
            Err(err) => {
                if let Some(placeholder_key) = &placeholder_key {
                    self.view.write(|doc| doc.remove(placeholder_key));
                    tracing::warn!("Rolled back creation of {}: {}", placeholder_key, err);
                }
                return Err(self.fail(&ticket, err));
            }
        };

        if let Some(placeholder_key) = &placeholder_key {
            let finalised = self
                .view
                .render(
                    node.clone(),
                    RenderState::default(),
                    self.registry.can_have_children(node_type),
                )
                .and_then(|item| self.view.write(|doc| doc.replace(placeholder_key, item)));
            if let Err(err) = finalised {
                self.view.write(|doc| doc.remove(placeholder_key));
                return Err(self.fail(&ticket, err));
            }
        }

        self.events.emit(TreeEvent::NodeAdd {
            node: node.clone(),
            placeholder: placeholder_key.map(|key| key.id),
        });
        self.operations
            .complete_operation(&ticket.id, OperationStatus::Success, None);
        tracing::info!("Created {}", node.key());
        self.notifier
            .notify(Notification::success(format!("{} created", self.display_name(node_type))));
        Ok(node)
    }

    /// Apply `partial` to a rendered node, restoring it if the backend refuses
    pub async fn update_item(
        &self,
        node_type: NodeType,
        id: &NodeId,
        partial: Map<String, Value>,
    ) -> Result<Node, TreeError> {
        let key = ItemKey::new(node_type, id.clone());
        if partial.is_empty() {
            return Err(self.reject(ValidationError::EmptyUpdate(key.to_string()).into()));
        }
        let Some(item) = self.view.item(&key) else {
            return Err(self.reject(TreeError::item_not_found(&key)));
        };

        let mut ticket = self.operations.start_operation(
            OperationKind::Update,
            node_type,
            Some(id.clone()),
            self.config.timeout_for(OperationKind::Update),
        );

        let snapshot = ItemSnapshot {
            node: item.node.clone(),
            state: item.state.clone(),
        };
        let mut optimistic = item.node;
        optimistic.apply_patch(&partial);
        let pending = RenderState {
            pending: true,
            ..snapshot.state.clone()
        };
        if let Err(err) = self.view.set_item(&key, optimistic, pending) {
            return Err(self.fail(&ticket, err));
        }

        let result = self
            .race(&mut ticket, self.data.update(node_type, id, partial))
            .await
            .and_then(|record| {
                Node::from_record(record, node_type, snapshot.node.parent_id.as_ref())
                    .map_err(TreeError::from)
            });

        let node = match result {
            Ok(node) => node,
            Err(err) => {
                self.rollback_update(&key, snapshot);
                return Err(self.fail(&ticket, err));
            }
        };

        // the item may have been collapsed away while the call was in flight
        let state = self
            .view
            .item(&key)
            .map(|current| RenderState {
                pending: false,
                ..current.state
            })
            .unwrap_or_default();
        if let Err(err) = self.view.set_item(&key, node.clone(), state) {
            tracing::debug!("Confirmed update of {} is no longer rendered: {}", key, err);
        }

        self.events.emit(TreeEvent::NodeEdit { node: node.clone() });
        self.operations
            .complete_operation(&ticket.id, OperationStatus::Success, None);
        tracing::info!("Updated {}", key);
        Ok(node)
    }

    /// Remove a node, reinserting it at its original position on failure
    pub async fn delete_item(&self, node_type: NodeType, id: &NodeId) -> Result<(), TreeError> {
        let key = ItemKey::new(node_type, id.clone());
        let Some(item) = self.view.item(&key) else {
            return Err(self.reject(TreeError::item_not_found(&key)));
        };

        let mut ticket = self.operations.start_operation(
            OperationKind::Delete,
            node_type,
            Some(id.clone()),
            self.config.timeout_for(OperationKind::Delete),
        );

        let original_state = item.state;
        let removed = self
            .view
            .update_state(&key, |state| state.removing = true)
            .and_then(|_| {
                self.view
                    .write(|doc| doc.remove(&key))
                    .ok_or_else(|| TreeError::item_not_found(&key))
            });
        let mut removed = match removed {
            Ok(removed) => removed,
            Err(err) => return Err(self.fail(&ticket, err)),
        };

        if let Err(err) = self.race(&mut ticket, self.data.delete(node_type, id)).await {
            if let Some(root) = removed.root_mut() {
                root.state = original_state;
                if let Err(e) = root.rerender(self.view.renderer()) {
                    tracing::warn!("Could not re-render {}: {}", key, e);
                }
            }
            match self.view.write(|doc| doc.restore(removed)) {
                Ok(()) => tracing::warn!("Rolled back deletion of {}: {}", key, err),
                Err(e) => tracing::warn!("Could not restore {} after failed delete: {}", key, e),
            }
            return Err(self.fail(&ticket, err));
        }

        self.events.emit(TreeEvent::NodeCleanup { key: key.clone() });
        self.events.emit(TreeEvent::NodeDelete { key: key.clone() });
        self.operations
            .complete_operation(&ticket.id, OperationStatus::Success, None);
        tracing::info!("Deleted {}", key);
        self.notifier
            .notify(Notification::success(format!("{} deleted", self.display_name(node_type))));
        Ok(())
    }

    /// Check an add request; returns the parent item key, if any
    fn validate_add(
        &self,
        node_type: NodeType,
        fields: &[&str],
        parent_id: Option<&NodeId>,
    ) -> Result<Option<ItemKey>, TreeError> {
        let config = self.registry.get(node_type)?;
        if fields.is_empty() {
            return Err(ValidationError::MissingField("fields".to_string()).into());
        }
        if let Some(missing) = config
            .required_fields
            .iter()
            .find(|required| !fields.contains(&required.as_str()))
        {
            return Err(ValidationError::MissingField(missing.clone()).into());
        }

        match (self.registry.parent_type(node_type), parent_id) {
            (None, None) => Ok(None),
            (None, Some(parent_id)) => Err(ValidationError::InvalidParent(format!(
                "{} is a root type and cannot be placed under {}",
                node_type, parent_id
            ))
            .into()),
            (Some(parent_type), None) => Err(ValidationError::InvalidParent(format!(
                "{} requires a parent {}",
                node_type, parent_type
            ))
            .into()),
            (Some(parent_type), Some(parent_id)) => {
                let parent = ItemKey::new(parent_type, parent_id.clone());
                if !self.view.contains(&parent) {
                    return Err(TreeError::item_not_found(&parent));
                }
                Ok(Some(parent))
            }
        }
    }

    /// Whether children of `parent` are on screen; root items always are
    fn children_visible(&self, parent: Option<&ItemKey>) -> bool {
        match parent {
            None => true,
            Some(parent) => self
                .view
                .item(parent)
                .is_some_and(|item| item.state.phase == NodePhase::Expanded),
        }
    }

    /// Render a pending placeholder for a node being created
    fn insert_placeholder(
        &self,
        node_type: NodeType,
        fields: &[&str],
        parent: Option<&ItemKey>,
        parent_id: Option<NodeId>,
        values: &Map<String, Value>,
    ) -> Result<ItemKey, TreeError> {
        let placeholder = self.placeholder(node_type, parent_id, values);
        let key = placeholder.key();
        let state = RenderState {
            pending: true,
            editable_fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        };
        let item = self
            .view
            .render(placeholder, state, self.registry.can_have_children(node_type))?;
        self.view.write(|doc| doc.append(parent, item))?;
        Ok(key)
    }

    fn placeholder(
        &self,
        node_type: NodeType,
        parent_id: Option<NodeId>,
        values: &Map<String, Value>,
    ) -> Node {
        let mut timestamp = Utc::now().timestamp_millis();
        let mut id = NodeId::new(format!("temp-{}-{}", node_type, timestamp));
        while self.view.contains(&ItemKey::new(node_type, id.clone())) {
            timestamp += 1;
            id = NodeId::new(format!("temp-{}-{}", node_type, timestamp));
        }

        let mut node = Node::new(id, node_type, "", parent_id);
        node.apply_patch(values);
        node
    }

    /// Create request body: the values plus the parent reference field
    fn create_payload(
        &self,
        node_type: NodeType,
        parent_id: Option<&NodeId>,
        mut values: Map<String, Value>,
    ) -> Map<String, Value> {
        let parent_field = self
            .registry
            .get(node_type)
            .ok()
            .and_then(|config| config.parent_field.clone());
        if let (Some(field), Some(parent_id)) = (parent_field, parent_id) {
            values.insert(field, Value::String(parent_id.to_string()));
        }
        values
    }

    fn rollback_update(&self, key: &ItemKey, snapshot: ItemSnapshot) {
        match self.view.set_item(key, snapshot.node, snapshot.state) {
            Ok(()) => tracing::warn!("Rolled back update of {}", key),
            Err(e) => tracing::debug!("Nothing to roll back for {}: {}", key, e),
        }
    }

    /// Run a remote call until it settles or the operation expires
    ///
    /// A result arriving after expiry is dropped.
    async fn race<T>(
        &self,
        ticket: &mut OperationTicket,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, TreeError> {
        tokio::select! {
            result = call => result.map_err(TreeError::from),
            Some(err) = ticket.expired() => Err(err),
        }
    }

    /// Record a failed operation and report it
    fn fail(&self, ticket: &OperationTicket, err: TreeError) -> TreeError {
        match &err {
            // already terminal and reported by the manager
            TreeError::Timeout { .. } | TreeError::Cancelled { .. } => {}
            _ => {
                self.operations.complete_operation(
                    &ticket.id,
                    OperationStatus::Error,
                    Some(err.to_string()),
                );
                self.notifier
                    .notify(Notification::error(err.to_string(), err.is_retryable()));
            }
        }
        err
    }

    /// Report an input error raised before any operation was started
    fn reject(&self, err: TreeError) -> TreeError {
        tracing::debug!("Rejected request: {}", err);
        self.notifier.notify(Notification::error(err.to_string(), false));
        err
    }

    fn display_name(&self, node_type: NodeType) -> String {
        self.registry
            .get(node_type)
            .map(|config| config.display_name.clone())
            .unwrap_or_else(|_| node_type.to_string())
    }
}

#[cfg(test)]
#[path = "crud_controller_test.rs"]
mod crud_controller_test;
