//! In-memory DataService
//!
//! Backs the dev session and the test suites. Besides plain CRUD it can:
//!
//! - answer list calls in any of the accepted envelope shapes
//! - fail the next call of a given kind with a scripted [`RemoteError`]
//! - hang a kind of call forever, to exercise operation timeouts
//! - count calls per kind, to assert cache hits

use crate::behaviors::NodeTypeRegistry;
use crate::models::{Node, NodeId, NodeRecord, NodeType};
use crate::services::data_service::{DataService, ListQuery};
use crate::services::error::RemoteError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Shape of list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `[...]`
    Bare,
    /// `{"results": [...], "count": n, "next": ...}`
    Results,
    /// `{"data": [...], "hasMore": ...}`
    Data,
    /// `{"nodes": [...], "hasMore": ...}`
    Nodes,
}

/// Kind of data service call, for failure injection and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCall {
    List,
    GetChildren,
    Create,
    Update,
    Delete,
}

struct Inner {
    nodes: HashMap<NodeType, Vec<Node>>,
    next_id: u64,
    envelope: Envelope,
    failures: HashMap<DataCall, VecDeque<RemoteError>>,
    hanging: HashSet<DataCall>,
    calls: HashMap<DataCall, usize>,
}

/// DataService over an in-process node table
pub struct InMemoryDataService {
    registry: NodeTypeRegistry,
    inner: Mutex<Inner>,
}

impl Default for InMemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataService {
    pub fn new() -> Self {
        Self {
            registry: NodeTypeRegistry::default(),
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                next_id: 1,
                envelope: Envelope::Nodes,
                failures: HashMap::new(),
                hanging: HashSet::new(),
                calls: HashMap::new(),
            }),
        }
    }

    /// Create a service pre-populated with `nodes`
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let service = Self::new();
        for node in nodes {
            service.insert(node);
        }
        service
    }

    /// Insert or replace a node
    pub fn insert(&self, node: Node) {
        let mut inner = self.lock();
        let table = inner.nodes.entry(node.node_type).or_default();
        match table.iter_mut().find(|existing| existing.id == node.id) {
            Some(existing) => *existing = node,
            None => table.push(node),
        }
    }

    /// Id the next create will be assigned
    pub fn set_next_id(&self, next_id: u64) {
        self.lock().next_id = next_id;
    }

    pub fn set_envelope(&self, envelope: Envelope) {
        self.lock().envelope = envelope;
    }

    /// Fail the next `call` with `error`; queued failures are consumed in order
    pub fn fail_next(&self, call: DataCall, error: RemoteError) {
        self.lock().failures.entry(call).or_default().push_back(error);
    }

    /// Make every `call` of this kind never resolve
    pub fn hang(&self, call: DataCall, hanging: bool) {
        let mut inner = self.lock();
        if hanging {
            inner.hanging.insert(call);
        } else {
            inner.hanging.remove(&call);
        }
    }

    pub fn call_count(&self, call: DataCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Snapshot of stored nodes of one type
    pub fn nodes(&self, node_type: NodeType) -> Vec<Node> {
        self.lock().nodes.get(&node_type).cloned().unwrap_or_default()
    }

    pub fn get(&self, node_type: NodeType, id: &NodeId) -> Option<Node> {
        self.lock()
            .nodes
            .get(&node_type)
            .and_then(|table| table.iter().find(|node| &node.id == id).cloned())
    }

    /// Count the call, then apply injected failures and hangs
    async fn enter(&self, call: DataCall) -> Result<(), RemoteError> {
        let (failure, hanging) = {
            let mut inner = self.lock();
            *inner.calls.entry(call).or_insert(0) += 1;
            let failure = inner.failures.get_mut(&call).and_then(|queue| queue.pop_front());
            (failure, inner.hanging.contains(&call))
        };

        if let Some(error) = failure {
            return Err(error);
        }
        if hanging {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn page(&self, candidates: Vec<Node>, query: &ListQuery) -> Value {
        let mut matching: Vec<Node> = match query.filter.as_deref() {
            Some(filter) => {
                let needle = filter.to_lowercase();
                candidates
                    .into_iter()
                    .filter(|node| node.name.to_lowercase().contains(&needle))
                    .collect()
            }
            None => candidates,
        };

        match query.ordering.as_deref() {
            Some("name") => matching.sort_by(|a, b| a.name.cmp(&b.name)),
            Some("-name") => matching.sort_by(|a, b| b.name.cmp(&a.name)),
            _ => {}
        }

        let total = matching.len();
        let limit = if query.limit == 0 { total } else { query.limit };
        let records: Vec<Value> = matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|node| serde_json::to_value(to_record(node)).unwrap_or(Value::Null))
            .collect();
        let has_more = query.offset + records.len() < total;

        match self.lock().envelope {
            Envelope::Bare => Value::Array(records),
            Envelope::Results => json!({
                "results": records,
                "count": total,
                "next": if has_more {
                    Value::String(format!("?offset={}", query.offset + limit))
                } else {
                    Value::Null
                },
            }),
            Envelope::Data => json!({"data": records, "hasMore": has_more}),
            Envelope::Nodes => json!({"nodes": records, "hasMore": has_more}),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wire form of a node: no `type`, parent kept as `parentId`
fn to_record(node: Node) -> NodeRecord {
    NodeRecord {
        id: node.id,
        node_type: None,
        name: node.name,
        parent_id: node.parent_id,
        attributes: node.attributes,
    }
}

fn id_from_value(value: &Value) -> Option<NodeId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(NodeId::from(s.as_str())),
        Value::Number(n) => Some(NodeId::new(n.to_string())),
        _ => None,
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn list(&self, node_type: NodeType, query: &ListQuery) -> Result<Value, RemoteError> {
        self.enter(DataCall::List).await?;
        let candidates = self.nodes(node_type);
        Ok(self.page(candidates, query))
    }

    async fn get_children(
        &self,
        child_type: NodeType,
        parent_id: &NodeId,
        query: &ListQuery,
    ) -> Result<Value, RemoteError> {
        self.enter(DataCall::GetChildren).await?;
        let candidates = self
            .nodes(child_type)
            .into_iter()
            .filter(|node| node.parent_id.as_ref() == Some(parent_id))
            .collect();
        Ok(self.page(candidates, query))
    }

    async fn create(
        &self,
        node_type: NodeType,
        mut data: Map<String, Value>,
    ) -> Result<NodeRecord, RemoteError> {
        self.enter(DataCall::Create).await?;

        let name = match data.remove("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => return Err(RemoteError::from_status(400, "name: this field is required")),
        };

        let parent_field = self
            .registry
            .get(node_type)
            .ok()
            .and_then(|config| config.parent_field.clone());
        let parent_id = match parent_field {
            Some(field) => {
                let parent = data
                    .remove(&field)
                    .as_ref()
                    .and_then(id_from_value)
                    .ok_or_else(|| {
                        RemoteError::from_status(400, format!("{}: this field is required", field))
                    })?;
                Some(parent)
            }
            None => None,
        };

        let node = {
            let mut inner = self.lock();
            let id = NodeId::from(inner.next_id);
            inner.next_id += 1;
            Node {
                id,
                node_type,
                name,
                parent_id,
                attributes: data,
            }
        };

        self.insert(node.clone());
        Ok(to_record(node))
    }

    async fn update(
        &self,
        node_type: NodeType,
        id: &NodeId,
        data: Map<String, Value>,
    ) -> Result<NodeRecord, RemoteError> {
        self.enter(DataCall::Update).await?;

        let mut node = self
            .get(node_type, id)
            .ok_or_else(|| RemoteError::from_status(404, format!("{} {} not found", node_type, id)))?;
        node.apply_patch(&data);
        self.insert(node.clone());
        Ok(to_record(node))
    }

    async fn delete(&self, node_type: NodeType, id: &NodeId) -> Result<(), RemoteError> {
        self.enter(DataCall::Delete).await?;

        let mut inner = self.lock();
        let table = inner.nodes.entry(node_type).or_default();
        let before = table.len();
        table.retain(|node| &node.id != id);
        if table.len() == before {
            return Err(RemoteError::from_status(404, format!("{} {} not found", node_type, id)));
        }
        Ok(())
    }
}
