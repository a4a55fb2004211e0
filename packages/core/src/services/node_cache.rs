//! Client-side node cache
//!
//! Keeps every node the tree has fetched, grouped by type, so that
//! re-expanding a previously seen subtree does not hit the network.
//!
//! # Lookup semantics
//!
//! [`NodeCache::get_children`] answers with a tri-state:
//!
//! - `NotFetched` - children of this parent were never requested
//! - `Empty` - they were requested and the backend returned none
//! - `Populated` - cached children, in insertion order
//!
//! # Eviction
//!
//! Evicting a node also drops the cached nodes one level below it.
//! Grandchildren are left in place.

use crate::behaviors::NodeTypeRegistry;
use crate::models::{ItemKey, Node, NodeId, NodeType};
use std::collections::{HashMap, HashSet};

/// Result of a cache lookup for a parent's children
#[derive(Debug, Clone, PartialEq)]
pub enum CachedChildren {
    NotFetched,
    Empty,
    Populated(Vec<Node>),
}

impl CachedChildren {
    /// Cached children, if any are present
    pub fn nodes(self) -> Option<Vec<Node>> {
        match self {
            CachedChildren::Populated(nodes) => Some(nodes),
            _ => None,
        }
    }
}

/// In-memory multi-type node store
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<NodeType, Vec<Node>>,
    /// Parents whose children have been fetched at least once
    fetched: HashSet<ItemKey>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached children of a parent
    pub fn get_children(
        &self,
        registry: &NodeTypeRegistry,
        parent_type: NodeType,
        parent_id: &NodeId,
    ) -> CachedChildren {
        let Some(child_type) = registry.child_type(parent_type) else {
            return CachedChildren::Empty;
        };

        let children: Vec<Node> = self
            .nodes
            .get(&child_type)
            .map(|table| {
                table
                    .iter()
                    .filter(|node| node.parent_id.as_ref() == Some(parent_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !children.is_empty() {
            CachedChildren::Populated(children)
        } else if self
            .fetched
            .contains(&ItemKey::new(parent_type, parent_id.clone()))
        {
            CachedChildren::Empty
        } else {
            CachedChildren::NotFetched
        }
    }

    /// Upsert fetched nodes of `child_type`
    ///
    /// Existing entries are replaced in place, new ones appended. When
    /// `parent` is given, nodes without a parent reference are stamped with
    /// it and the parent is recorded as fetched.
    pub fn store(&mut self, child_type: NodeType, parent: Option<&ItemKey>, nodes: Vec<Node>) {
        let table = self.nodes.entry(child_type).or_default();

        for mut node in nodes {
            node.node_type = child_type;
            if node.parent_id.is_none() {
                node.parent_id = parent.map(|key| key.id.clone());
            }

            match table.iter_mut().find(|existing| existing.id == node.id) {
                Some(existing) => *existing = node,
                None => table.push(node),
            }
        }

        if let Some(parent) = parent {
            self.fetched.insert(parent.clone());
        }
    }

    /// Upsert a single node (e.g. one created or edited through CRUD)
    pub fn upsert(&mut self, node: Node) {
        let table = self.nodes.entry(node.node_type).or_default();
        match table.iter_mut().find(|existing| existing.id == node.id) {
            Some(existing) => *existing = node,
            None => table.push(node),
        }
    }

    /// Remove a node and its cached direct children; returns how many were dropped
    pub fn evict(&mut self, registry: &NodeTypeRegistry, node_type: NodeType, id: &NodeId) -> usize {
        let mut removed = 0;

        if let Some(table) = self.nodes.get_mut(&node_type) {
            let before = table.len();
            table.retain(|node| &node.id != id);
            removed += before - table.len();
        }

        if let Some(child_type) = registry.child_type(node_type) {
            if let Some(table) = self.nodes.get_mut(&child_type) {
                let before = table.len();
                table.retain(|node| node.parent_id.as_ref() != Some(id));
                removed += before - table.len();
            }
        }

        self.fetched.remove(&ItemKey::new(node_type, id.clone()));
        removed
    }

    /// Children of `parent` were fetched at least once
    pub fn is_fetched(&self, parent: &ItemKey) -> bool {
        self.fetched.contains(parent)
    }

    pub fn get(&self, key: &ItemKey) -> Option<&Node> {
        self.nodes
            .get(&key.node_type)
            .and_then(|table| table.iter().find(|node| node.id == key.id))
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.get(key).is_some()
    }

    /// Cached nodes of one type, in insertion order
    pub fn nodes(&self, node_type: NodeType) -> &[Node] {
        self.nodes
            .get(&node_type)
            .map(|table| table.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, node_type: NodeType) -> usize {
        self.nodes(node_type).len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.values().all(|table| table.is_empty())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.fetched.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            projects: self.len(NodeType::Project),
            locations: self.len(NodeType::Location),
            measurements: self.len(NodeType::Measurement),
            fetched_parents: self.fetched.len(),
        }
    }
}

/// Statistics about the node cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub projects: usize,
    pub locations: usize,
    pub measurements: usize,
    /// Parents whose children have been fetched at least once
    pub fetched_parents: usize,
}
