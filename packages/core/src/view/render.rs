//! Pure rendering of tree items
//!
//! A rendered item is a value: label, classes and attributes derived from a
//! node's data plus its UI state. Rendering the same node in the same state
//! always yields the same [`RenderedItem`], which is what makes rollback a
//! matter of re-rendering old data.

use crate::models::{ItemKey, Node};
use crate::services::error::TreeError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Expansion phase of one item
///
/// `Collapsed → Expanding → Expanded → Collapsing → Collapsed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    #[default]
    Collapsed,
    Expanding,
    Expanded,
    Collapsing,
}

impl NodePhase {
    pub fn is_transitioning(&self) -> bool {
        matches!(self, NodePhase::Expanding | NodePhase::Collapsing)
    }
}

/// Disclosure icon shown next to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disclosure {
    /// Leaf types have no toggle
    None,
    Collapsed,
    Loading,
    Expanded,
}

impl Disclosure {
    pub fn glyph(&self) -> &'static str {
        match self {
            Disclosure::None => " ",
            Disclosure::Collapsed => "▸",
            Disclosure::Loading => "…",
            Disclosure::Expanded => "▾",
        }
    }
}

/// UI state of an item that is not part of its data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    pub phase: NodePhase,
    /// Children are being fetched
    pub loading: bool,
    /// Optimistic change not yet confirmed by the backend
    pub pending: bool,
    /// Fading out ahead of removal
    pub removing: bool,
    /// Fields open for inline editing (placeholders)
    pub editable_fields: Vec<String>,
}

/// Output of a [`NodeRenderer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedItem {
    pub key: ItemKey,
    pub label: String,
    pub disclosure: Disclosure,
    pub classes: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
}

impl RenderedItem {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Turns node data and UI state into a rendered item
pub trait NodeRenderer: Send + Sync {
    fn render(
        &self,
        node: &Node,
        state: &RenderState,
        can_have_children: bool,
    ) -> Result<RenderedItem, TreeError>;
}

/// Standard tree item markup
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRenderer;

impl NodeRenderer for DefaultRenderer {
    fn render(
        &self,
        node: &Node,
        state: &RenderState,
        can_have_children: bool,
    ) -> Result<RenderedItem, TreeError> {
        let key = node.key();
        if node.id.as_str().trim().is_empty() {
            return Err(TreeError::render(key, "node has an empty id"));
        }

        let label = if node.name.trim().is_empty() {
            format!("Untitled {} #{}", node.node_type, node.id)
        } else {
            node.name.clone()
        };

        let expanded = state.phase == NodePhase::Expanded;
        let disclosure = match (can_have_children, state.loading, state.phase) {
            (false, _, _) => Disclosure::None,
            (true, true, _) => Disclosure::Loading,
            (true, false, NodePhase::Expanded) | (true, false, NodePhase::Collapsing) => {
                Disclosure::Expanded
            }
            (true, false, _) => Disclosure::Collapsed,
        };

        let mut classes = BTreeSet::new();
        classes.insert("tree-item".to_string());
        classes.insert(format!("tree-item--{}", node.node_type));
        if can_have_children {
            classes.insert("has-children".to_string());
            classes.insert(if expanded { "expanded" } else { "collapsed" }.to_string());
        }
        match state.phase {
            NodePhase::Expanding => {
                classes.insert("expanding".to_string());
            }
            NodePhase::Collapsing => {
                classes.insert("collapsing".to_string());
            }
            _ => {}
        }
        if state.loading {
            classes.insert("loading".to_string());
        }
        if state.pending {
            classes.insert("pending".to_string());
        }
        if state.removing {
            classes.insert("removing".to_string());
        }
        if !state.editable_fields.is_empty() {
            classes.insert("editing".to_string());
        }

        let mut attributes = BTreeMap::new();
        attributes.insert("data-id".to_string(), node.id.to_string());
        attributes.insert("data-type".to_string(), node.node_type.to_string());
        attributes.insert("role".to_string(), "treeitem".to_string());
        if let Some(parent) = &node.parent_id {
            attributes.insert("data-parent-id".to_string(), parent.to_string());
        }
        if can_have_children {
            attributes.insert("aria-expanded".to_string(), expanded.to_string());
        }
        if state.loading {
            attributes.insert("aria-busy".to_string(), "true".to_string());
        }
        if !state.editable_fields.is_empty() {
            attributes.insert("data-editable".to_string(), state.editable_fields.join(","));
        }

        Ok(RenderedItem {
            key,
            label,
            disclosure,
            classes,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    #[test]
    fn test_collapsed_project() {
        let node = Node::new("p1", NodeType::Project, "Harbour", None);
        let item = DefaultRenderer
            .render(&node, &RenderState::default(), true)
            .unwrap();

        assert_eq!(item.label, "Harbour");
        assert_eq!(item.disclosure, Disclosure::Collapsed);
        assert_eq!(item.attribute("aria-expanded"), Some("false"));
        assert_eq!(item.attribute("data-id"), Some("p1"));
        assert!(item.has_class("collapsed"));
        assert!(item.has_class("tree-item--project"));
    }

    #[test]
    fn test_expanded_and_loading() {
        let node = Node::new("p1", NodeType::Project, "Harbour", None);

        let expanded = RenderState {
            phase: NodePhase::Expanded,
            ..Default::default()
        };
        let item = DefaultRenderer.render(&node, &expanded, true).unwrap();
        assert_eq!(item.disclosure, Disclosure::Expanded);
        assert_eq!(item.attribute("aria-expanded"), Some("true"));

        let loading = RenderState {
            phase: NodePhase::Expanding,
            loading: true,
            ..Default::default()
        };
        let item = DefaultRenderer.render(&node, &loading, true).unwrap();
        assert_eq!(item.disclosure, Disclosure::Loading);
        assert_eq!(item.attribute("aria-busy"), Some("true"));
        assert!(item.has_class("expanding"));
    }

    #[test]
    fn test_leaf_has_no_disclosure() {
        let node = Node::new("m1", NodeType::Measurement, "Depth", Some("l1".into()));
        let item = DefaultRenderer
            .render(&node, &RenderState::default(), false)
            .unwrap();

        assert_eq!(item.disclosure, Disclosure::None);
        assert_eq!(item.attribute("aria-expanded"), None);
        assert_eq!(item.attribute("data-parent-id"), Some("l1"));
    }

    #[test]
    fn test_untitled_label() {
        let node = Node::new("m1", NodeType::Measurement, "  ", None);
        let item = DefaultRenderer
            .render(&node, &RenderState::default(), false)
            .unwrap();
        assert_eq!(item.label, "Untitled measurement #m1");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let node = Node::new("l1", NodeType::Location, "Quay", Some("p1".into()));
        let state = RenderState {
            pending: true,
            ..Default::default()
        };
        assert_eq!(
            DefaultRenderer.render(&node, &state, true).unwrap(),
            DefaultRenderer.render(&node, &state, true).unwrap()
        );
    }
}
