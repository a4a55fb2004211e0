//! Node Data Structures
//!
//! This module defines the `Node` struct shared by the tree, the cache and the
//! CRUD layer, together with the identifiers used to address nodes.
//!
//! # Architecture
//!
//! - **Closed type set**: every node is a project, a location or a measurement
//! - **Opaque ids**: the backend may send string or numeric ids; both normalise
//!   to one canonical [`NodeId`]
//! - **Pass-through attributes**: domain fields the tree does not interpret
//!   (address, description, ...) travel in `attributes` unchanged
//!
//! # Examples
//!
//! ```rust
//! use fieldtree_core::models::{Node, NodeId, NodeType};
//! use serde_json::json;
//!
//! let node: Node = serde_json::from_value(json!({
//!     "id": 42,
//!     "type": "location",
//!     "name": "Loc A",
//!     "parentId": "p1",
//!     "address": "Main St 1"
//! }))
//! .unwrap();
//!
//! assert_eq!(node.id, NodeId::from("42"));
//! assert_eq!(node.node_type, NodeType::Location);
//! assert_eq!(node.attributes["address"], "Main St 1");
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for caller input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid node ID format: {0}")]
    InvalidId(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Node type '{0}' cannot have children")]
    ChildrenNotSupported(String),

    #[error("Empty update for node '{0}'")]
    EmptyUpdate(String),
}

/// The fixed set of node types in the hierarchy
///
/// Projects contain locations, locations contain measurements. The
/// parent/child wiring itself lives in the
/// [`NodeTypeRegistry`](crate::behaviors::NodeTypeRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Project,
    Location,
    Measurement,
}

impl NodeType {
    /// All node types, root first
    pub const ALL: [NodeType; 3] = [NodeType::Project, NodeType::Location, NodeType::Measurement];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Project => "project",
            NodeType::Location => "location",
            NodeType::Measurement => "measurement",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(NodeType::Project),
            "location" => Ok(NodeType::Location),
            "measurement" => Ok(NodeType::Measurement),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

/// Opaque node identifier
///
/// The backend uses numeric primary keys while placeholders and tests use
/// strings. Both forms deserialize into the same canonical string so that
/// `42` and `"42"` address the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids of optimistic placeholders start with `temp-`
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with("temp-")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

struct NodeIdVisitor;

impl<'de> Visitor<'de> for NodeIdVisitor {
    type Value = NodeId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer node id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
        Ok(NodeId(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<NodeId, E> {
        Ok(NodeId(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeId, E> {
        Ok(NodeId(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeId, E> {
        Ok(NodeId(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<NodeId, E> {
        if v.fract() == 0.0 && v.is_finite() {
            Ok(NodeId((v as i64).to_string()))
        } else {
            Err(E::custom(format!("non-integer node id {}", v)))
        }
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeIdVisitor)
    }
}

/// Address of a node in the tree: ids are only unique within a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemKey {
    pub node_type: NodeType,
    pub id: NodeId,
}

impl ItemKey {
    pub fn new(node_type: NodeType, id: impl Into<NodeId>) -> Self {
        Self {
            node_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_type, self.id)
    }
}

/// A node record as it arrives from the backend
///
/// `type` and the parent reference are frequently absent from list and
/// create responses; the receiver stamps them from context through
/// [`Node::from_record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "parent_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One entity of the hierarchy
///
/// # Fields
///
/// - `id`: identifier, unique within `node_type`
/// - `node_type`: project, location or measurement
/// - `name`: display label
/// - `parent_id`: owning node, `None` for root-level projects
/// - `attributes`: additional domain fields, passed through opaquely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<NodeId>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Node {
    /// Create a node without extra attributes
    pub fn new(
        id: impl Into<NodeId>,
        node_type: NodeType,
        name: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            parent_id,
            attributes: Map::new(),
        }
    }

    /// Build a node from a wire record, stamping type and parent from context
    ///
    /// A record that names a type must name `expected_type`; an unknown type
    /// string is rejected. `parent_id` is only stamped when the record does
    /// not carry its own.
    pub fn from_record(
        record: NodeRecord,
        expected_type: NodeType,
        parent_id: Option<&NodeId>,
    ) -> Result<Self, ValidationError> {
        if let Some(raw) = record.node_type.as_deref() {
            let parsed: NodeType = raw.parse()?;
            if parsed != expected_type {
                return Err(ValidationError::InvalidNodeType(format!(
                    "expected {}, got {}",
                    expected_type, parsed
                )));
            }
        }

        if record.id.as_str().is_empty() {
            return Err(ValidationError::InvalidId(String::new()));
        }

        Ok(Self {
            id: record.id,
            node_type: expected_type,
            name: record.name,
            parent_id: record.parent_id.or_else(|| parent_id.cloned()),
            attributes: record.attributes,
        })
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.node_type, self.id.clone())
    }

    /// Shallow-merge a partial update into this node
    ///
    /// `name` updates the label, `id` and `type` are ignored, everything else
    /// replaces the attribute of the same name wholesale.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (field, value) in patch {
            match field.as_str() {
                "id" | "type" => {}
                "name" => {
                    self.name = match value {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    }
                }
                _ => {
                    self.attributes.insert(field.clone(), value.clone());
                }
            }
        }
    }

    /// Read a field by name, covering `name` and attributes alike
    pub fn field(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.to_string())),
            "type" => Some(Value::String(self.node_type.to_string())),
            "name" => Some(Value::String(self.name.clone())),
            other => self.attributes.get(other).cloned(),
        }
    }
}
