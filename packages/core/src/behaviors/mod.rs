//! Node Type Registry
//!
//! Static per-type configuration of the hierarchy:
//!
//! - which type a node's children have, if any
//! - which fields a create must supply
//! - which field of a create payload names the parent
//!
//! The registry is built once at startup and never mutated. Child fetching
//! goes through [`NodeTypeRegistry::fetch_children`] so the tree never has to
//! know which endpoint serves which type.

use crate::models::{NodeId, NodePage, NodeType, ValidationError};
use crate::services::data_service::{DataService, ListQuery};
use crate::services::error::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration of one node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeConfig {
    pub node_type: NodeType,
    pub child_type: Option<NodeType>,
    pub can_have_children: bool,
    /// Label used in notifications ("Location", "Measurement", ...)
    pub display_name: String,
    /// Fields a create request must include
    pub required_fields: Vec<String>,
    /// Payload field carrying the parent id on create (e.g. `project`)
    pub parent_field: Option<String>,
}

impl NodeTypeConfig {
    fn leaf(node_type: NodeType, display_name: &str, parent_field: Option<&str>) -> Self {
        Self {
            node_type,
            child_type: None,
            can_have_children: false,
            display_name: display_name.to_string(),
            required_fields: vec!["name".to_string()],
            parent_field: parent_field.map(str::to_string),
        }
    }

    fn with_children(mut self, child_type: NodeType) -> Self {
        self.child_type = Some(child_type);
        self.can_have_children = true;
        self
    }
}

/// Lookup table of [`NodeTypeConfig`] by type
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeRegistry {
    configs: BTreeMap<NodeType, NodeTypeConfig>,
}

impl Default for NodeTypeRegistry {
    /// project → location → measurement
    fn default() -> Self {
        Self {
            configs: [
                NodeTypeConfig::leaf(NodeType::Project, "Project", None)
                    .with_children(NodeType::Location),
                NodeTypeConfig::leaf(NodeType::Location, "Location", Some("project"))
                    .with_children(NodeType::Measurement),
                NodeTypeConfig::leaf(NodeType::Measurement, "Measurement", Some("location")),
            ]
            .into_iter()
            .map(|config| (config.node_type, config))
            .collect(),
        }
    }
}

impl NodeTypeRegistry {
    /// Build a registry from explicit configs
    ///
    /// Rejects configs that claim children without naming a child type.
    pub fn new(configs: Vec<NodeTypeConfig>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for config in configs {
            if config.can_have_children && config.child_type.is_none() {
                return Err(ValidationError::MissingField(format!(
                    "{}.childType",
                    config.node_type
                )));
            }
            map.insert(config.node_type, config);
        }
        Ok(Self { configs: map })
    }

    /// Configuration of `node_type`; unregistered types are rejected
    pub fn get(&self, node_type: NodeType) -> Result<&NodeTypeConfig, ValidationError> {
        self.configs
            .get(&node_type)
            .ok_or_else(|| ValidationError::InvalidNodeType(node_type.to_string()))
    }

    /// Child type of `node_type` when it can have children
    pub fn child_type(&self, node_type: NodeType) -> Option<NodeType> {
        self.configs
            .get(&node_type)
            .filter(|config| config.can_have_children)
            .and_then(|config| config.child_type)
    }

    /// Type whose children are of `child_type`
    pub fn parent_type(&self, child_type: NodeType) -> Option<NodeType> {
        self.configs
            .values()
            .find(|config| config.can_have_children && config.child_type == Some(child_type))
            .map(|config| config.node_type)
    }

    /// Types that appear at the root of the tree
    pub fn root_types(&self) -> Vec<NodeType> {
        self.configs
            .keys()
            .copied()
            .filter(|node_type| self.parent_type(*node_type).is_none())
            .collect()
    }

    pub fn can_have_children(&self, node_type: NodeType) -> bool {
        self.child_type(node_type).is_some()
    }

    /// Fetch and normalise the children of a node
    pub async fn fetch_children(
        &self,
        data: &dyn DataService,
        parent_type: NodeType,
        parent_id: &NodeId,
        query: &ListQuery,
    ) -> Result<NodePage, TreeError> {
        let child_type = self
            .child_type(parent_type)
            .ok_or_else(|| ValidationError::ChildrenNotSupported(parent_type.to_string()))?;

        let payload = data.get_children(child_type, parent_id, query).await?;
        Ok(NodePage::from_response(payload, child_type, Some(parent_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hierarchy() {
        let registry = NodeTypeRegistry::default();
        assert_eq!(registry.child_type(NodeType::Project), Some(NodeType::Location));
        assert_eq!(registry.child_type(NodeType::Location), Some(NodeType::Measurement));
        assert_eq!(registry.child_type(NodeType::Measurement), None);
        assert_eq!(registry.parent_type(NodeType::Measurement), Some(NodeType::Location));
        assert_eq!(registry.parent_type(NodeType::Project), None);
        assert_eq!(registry.root_types(), vec![NodeType::Project]);
    }

    #[test]
    fn test_parent_fields() {
        let registry = NodeTypeRegistry::default();
        assert_eq!(registry.get(NodeType::Project).unwrap().parent_field, None);
        assert_eq!(
            registry.get(NodeType::Location).unwrap().parent_field.as_deref(),
            Some("project")
        );
    }

    #[test]
    fn test_unregistered_type_is_rejected() {
        let registry = NodeTypeRegistry::new(vec![NodeTypeConfig::leaf(
            NodeType::Project,
            "Project",
            None,
        )])
        .unwrap();

        assert_eq!(
            registry.get(NodeType::Location).unwrap_err(),
            ValidationError::InvalidNodeType("location".to_string())
        );
        assert!(!registry.can_have_children(NodeType::Project));
    }

    #[test]
    fn test_children_flag_requires_child_type() {
        let mut config = NodeTypeConfig::leaf(NodeType::Project, "Project", None);
        config.can_have_children = true;

        let err = NodeTypeRegistry::new(vec![config]).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("project.childType".to_string()));
    }
}
