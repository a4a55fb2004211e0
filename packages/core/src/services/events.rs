//! UI Events
//!
//! Events emitted by the tree and CRUD controllers for the surrounding page
//! glue. They follow the observer pattern: controllers publish on an
//! [`EventBus`] backed by a tokio broadcast channel, and any number of
//! listeners (toasts, analytics, the tree's own cleanup listener) subscribe.
//!
//! # Event names
//!
//! | Event                     | Emitted when                                  |
//! |---------------------------|-----------------------------------------------|
//! | `tree:node:add`           | a created node was finalised                  |
//! | `tree:node:edit`          | an update was confirmed                       |
//! | `tree:node:delete`        | a delete was confirmed                        |
//! | `tree:node:load`          | children of a node were loaded                |
//! | `tree:node:cleanup`       | cached state of a deleted node must be purged |
//! | `tree:state:change`       | a node was expanded or collapsed              |
//! | `tree:render`             | the root list was (re)rendered                |
//! | `tree:destroy`            | the tree was torn down                        |
//! | `crud:operation:start`    | an operation was registered                   |
//! | `crud:operation:complete` | an operation reached a terminal status        |
//! | `crud:operation:retry`    | an operation timed out and was re-armed       |

use crate::models::{ItemKey, Node, NodeId, NodeType, PendingOperation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the broadcast channel; slow listeners lag beyond this
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    NodeAdd {
        node: Node,
        /// Id of the placeholder the node replaced
        placeholder: Option<NodeId>,
    },
    NodeEdit {
        node: Node,
    },
    NodeDelete {
        key: ItemKey,
    },
    NodeLoad {
        parent: ItemKey,
        count: usize,
        from_cache: bool,
    },
    NodeCleanup {
        key: ItemKey,
    },
    StateChange {
        key: ItemKey,
        expanded: bool,
    },
    Render {
        root_count: usize,
        has_more: bool,
    },
    Destroy,
    OperationStart {
        operation: PendingOperation,
    },
    OperationComplete {
        operation: PendingOperation,
    },
    OperationRetry {
        operation: PendingOperation,
        delay: Duration,
    },
}

/// Payload shared by all events: `{nodeId, nodeType, timestamp, ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub node_id: Option<NodeId>,
    pub node_type: Option<NodeType>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A timestamped [`TreeEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub event: TreeEvent,
    pub timestamp: DateTime<Utc>,
}

impl UiEvent {
    pub fn new(event: TreeEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match &self.event {
            TreeEvent::NodeAdd { .. } => "tree:node:add",
            TreeEvent::NodeEdit { .. } => "tree:node:edit",
            TreeEvent::NodeDelete { .. } => "tree:node:delete",
            TreeEvent::NodeLoad { .. } => "tree:node:load",
            TreeEvent::NodeCleanup { .. } => "tree:node:cleanup",
            TreeEvent::StateChange { .. } => "tree:state:change",
            TreeEvent::Render { .. } => "tree:render",
            TreeEvent::Destroy => "tree:destroy",
            TreeEvent::OperationStart { .. } => "crud:operation:start",
            TreeEvent::OperationComplete { .. } => "crud:operation:complete",
            TreeEvent::OperationRetry { .. } => "crud:operation:retry",
        }
    }

    /// Detail payload handed to page listeners
    pub fn detail(&self) -> EventDetail {
        let mut extra = Map::new();

        let (node_id, node_type) = match &self.event {
            TreeEvent::NodeAdd { node, placeholder } => {
                extra.insert("node".into(), to_value(node));
                if let Some(placeholder) = placeholder {
                    extra.insert("placeholderId".into(), json!(placeholder));
                }
                (Some(node.id.clone()), Some(node.node_type))
            }
            TreeEvent::NodeEdit { node } => {
                extra.insert("node".into(), to_value(node));
                (Some(node.id.clone()), Some(node.node_type))
            }
            TreeEvent::NodeDelete { key }
            | TreeEvent::NodeCleanup { key } => (Some(key.id.clone()), Some(key.node_type)),
            TreeEvent::NodeLoad {
                parent,
                count,
                from_cache,
            } => {
                extra.insert("count".into(), json!(count));
                extra.insert("fromCache".into(), json!(from_cache));
                (Some(parent.id.clone()), Some(parent.node_type))
            }
            TreeEvent::StateChange { key, expanded } => {
                extra.insert("expanded".into(), json!(expanded));
                (Some(key.id.clone()), Some(key.node_type))
            }
            TreeEvent::Render {
                root_count,
                has_more,
            } => {
                extra.insert("rootCount".into(), json!(root_count));
                extra.insert("hasMore".into(), json!(has_more));
                (None, None)
            }
            TreeEvent::Destroy => (None, None),
            TreeEvent::OperationStart { operation } | TreeEvent::OperationComplete { operation } => {
                extra.insert("operation".into(), to_value(operation));
                (operation.target_id.clone(), Some(operation.target_type))
            }
            TreeEvent::OperationRetry { operation, delay } => {
                extra.insert("operation".into(), to_value(operation));
                extra.insert("delayMs".into(), json!(delay.as_millis() as u64));
                (operation.target_id.clone(), Some(operation.target_type))
            }
        };

        EventDetail {
            node_id,
            node_type,
            timestamp: self.timestamp,
            extra,
        }
    }

    /// `{"type": ..., "detail": {...}}`, the shape page listeners consume
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.event_type(),
            "detail": to_value(&self.detail()),
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Broadcast hub for [`UiEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no listeners is not an error
    pub fn emit(&self, event: TreeEvent) {
        let event = UiEvent::new(event);
        tracing::trace!("Emitting {}", event.event_type());
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationId, OperationKind, OperationStatus};

    #[test]
    fn test_event_type_names() {
        let key = ItemKey::new(NodeType::Project, "p1");
        let cases = vec![
            (TreeEvent::NodeDelete { key: key.clone() }, "tree:node:delete"),
            (TreeEvent::NodeCleanup { key: key.clone() }, "tree:node:cleanup"),
            (
                TreeEvent::StateChange {
                    key: key.clone(),
                    expanded: true,
                },
                "tree:state:change",
            ),
            (
                TreeEvent::Render {
                    root_count: 0,
                    has_more: false,
                },
                "tree:render",
            ),
            (TreeEvent::Destroy, "tree:destroy"),
        ];

        for (event, name) in cases {
            assert_eq!(UiEvent::new(event).event_type(), name);
        }
    }

    #[test]
    fn test_detail_contract() {
        let event = UiEvent::new(TreeEvent::NodeLoad {
            parent: ItemKey::new(NodeType::Project, "p1"),
            count: 3,
            from_cache: false,
        });

        let json = event.to_json();
        assert_eq!(json["type"], "tree:node:load");
        assert_eq!(json["detail"]["nodeId"], "p1");
        assert_eq!(json["detail"]["nodeType"], "project");
        assert_eq!(json["detail"]["count"], 3);
        assert_eq!(json["detail"]["fromCache"], false);
        assert!(json["detail"]["timestamp"].is_string());
    }

    #[test]
    fn test_operation_detail_uses_target() {
        let operation = PendingOperation {
            id: OperationId::new(OperationKind::Update, NodeType::Measurement, 5, 0),
            kind: OperationKind::Update,
            target_type: NodeType::Measurement,
            target_id: Some("m7".into()),
            status: OperationStatus::Pending,
            attempts: 1,
            timeout: Duration::from_secs(60),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        };

        let detail = UiEvent::new(TreeEvent::OperationRetry {
            operation,
            delay: Duration::from_secs(120),
        })
        .detail();

        assert_eq!(detail.node_id, Some(NodeId::from("m7")));
        assert_eq!(detail.node_type, Some(NodeType::Measurement));
        assert_eq!(detail.extra["delayMs"], json!(120_000));
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(TreeEvent::Destroy);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, TreeEvent::Destroy);
    }

    #[test]
    fn test_emit_without_listeners_is_silent() {
        EventBus::new().emit(TreeEvent::Destroy);
    }
}
