//! Rendered tree document
//!
//! `TreeDocument` is the value model of what is on screen: an ordered list
//! of root items, each item holding its node data, UI state, rendered output
//! and ordered child keys. A browser binding mirrors it into real markup.

use crate::models::{ItemKey, Node};
use crate::services::error::TreeError;
use crate::view::render::{NodeRenderer, RenderState, RenderedItem};
use std::collections::HashMap;

/// One rendered node and its place in the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentItem {
    pub node: Node,
    pub state: RenderState,
    pub can_have_children: bool,
    pub rendered: RenderedItem,
    pub parent: Option<ItemKey>,
    pub children: Vec<ItemKey>,
}

impl DocumentItem {
    /// Render `node` in `state`
    pub fn render(
        renderer: &dyn NodeRenderer,
        node: Node,
        state: RenderState,
        can_have_children: bool,
    ) -> Result<Self, TreeError> {
        let rendered = renderer.render(&node, &state, can_have_children)?;
        Ok(Self {
            node,
            state,
            can_have_children,
            rendered,
            parent: None,
            children: Vec::new(),
        })
    }

    /// Re-render after a change to `node` or `state`
    pub fn rerender(&mut self, renderer: &dyn NodeRenderer) -> Result<(), TreeError> {
        self.rendered = renderer.render(&self.node, &self.state, self.can_have_children)?;
        Ok(())
    }

    pub fn key(&self) -> ItemKey {
        self.node.key()
    }
}

/// Where an item sat among its siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub parent: Option<ItemKey>,
    pub index: usize,
    pub prev: Option<ItemKey>,
    pub next: Option<ItemKey>,
}

/// An item removed together with its descendants
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSubtree {
    pub position: Position,
    /// Removed items, the subtree root first
    pub items: Vec<DocumentItem>,
}

impl RemovedSubtree {
    pub fn root_mut(&mut self) -> Option<&mut DocumentItem> {
        self.items.first_mut()
    }
}

/// Ordered, keyed model of the rendered tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeDocument {
    roots: Vec<ItemKey>,
    items: HashMap<ItemKey, DocumentItem>,
    /// Infinite-scroll sentinel is shown
    pub has_more: bool,
    /// A root page is being fetched
    pub loading_roots: bool,
}

impl TreeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[ItemKey] {
        &self.roots
    }

    pub fn get(&self, key: &ItemKey) -> Option<&DocumentItem> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &ItemKey) -> Option<&mut DocumentItem> {
        self.items.get_mut(key)
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Child keys of `parent`, or the roots for `None`
    pub fn children(&self, parent: Option<&ItemKey>) -> &[ItemKey] {
        match parent {
            None => &self.roots,
            Some(key) => self
                .items
                .get(key)
                .map(|item| item.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Append `item` under `parent` (or at the root)
    pub fn append(&mut self, parent: Option<&ItemKey>, item: DocumentItem) -> Result<(), TreeError> {
        let index = self.children(parent).len();
        self.insert_at(parent, index, item)
    }

    /// Insert `item` at `index` under `parent`, clamping the index
    ///
    /// An item already present under the same key is replaced.
    pub fn insert_at(
        &mut self,
        parent: Option<&ItemKey>,
        index: usize,
        mut item: DocumentItem,
    ) -> Result<(), TreeError> {
        if let Some(parent) = parent {
            if !self.items.contains_key(parent) {
                return Err(TreeError::item_not_found(parent));
            }
        }

        let key = item.key();
        if self.items.contains_key(&key) {
            self.remove(&key);
        }

        item.parent = parent.cloned();
        let siblings = self.siblings_mut(parent);
        let index = index.min(siblings.len());
        siblings.insert(index, key.clone());
        self.items.insert(key, item);
        Ok(())
    }

    /// Current position of `key` among its siblings
    pub fn position(&self, key: &ItemKey) -> Option<Position> {
        let item = self.items.get(key)?;
        let siblings = self.children(item.parent.as_ref());
        let index = siblings.iter().position(|k| k == key)?;
        Some(Position {
            parent: item.parent.clone(),
            index,
            prev: index.checked_sub(1).map(|i| siblings[i].clone()),
            next: siblings.get(index + 1).cloned(),
        })
    }

    /// Remove `key` and its descendants
    pub fn remove(&mut self, key: &ItemKey) -> Option<RemovedSubtree> {
        let position = self.position(key)?;
        self.siblings_mut(position.parent.as_ref())
            .retain(|k| k != key);

        let mut items = Vec::new();
        let mut stack = vec![key.clone()];
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items.remove(&next) {
                stack.extend(item.children.iter().rev().cloned());
                items.push(item);
            }
        }

        Some(RemovedSubtree { position, items })
    }

    /// Remove every descendant of `key`, keeping `key` itself
    pub fn clear_children(&mut self, key: &ItemKey) -> Vec<DocumentItem> {
        let children = match self.items.get_mut(key) {
            Some(item) => std::mem::take(&mut item.children),
            None => return Vec::new(),
        };

        let mut removed = Vec::new();
        let mut stack: Vec<ItemKey> = children.into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items.remove(&next) {
                stack.extend(item.children.iter().rev().cloned());
                removed.push(item);
            }
        }
        removed
    }

    /// Put a removed subtree back where it was
    ///
    /// The previous sibling is the preferred anchor, then the next sibling,
    /// then the recorded index.
    pub fn restore(&mut self, removed: RemovedSubtree) -> Result<(), TreeError> {
        let RemovedSubtree { position, items } = removed;
        let mut items = items.into_iter();
        let Some(root) = items.next() else {
            return Ok(());
        };

        let parent = position.parent.as_ref();
        if let Some(parent) = parent {
            if !self.items.contains_key(parent) {
                return Err(TreeError::item_not_found(parent));
            }
        }

        let siblings = self.children(parent);
        let index = position
            .prev
            .as_ref()
            .and_then(|prev| siblings.iter().position(|k| k == prev).map(|i| i + 1))
            .or_else(|| {
                position
                    .next
                    .as_ref()
                    .and_then(|next| siblings.iter().position(|k| k == next))
            })
            .unwrap_or(position.index);

        let root_key = root.key();
        let root_children = root.children.clone();
        self.insert_at(parent, index, root)?;
        if let Some(item) = self.items.get_mut(&root_key) {
            item.children = root_children;
        }

        for item in items {
            self.items.insert(item.key(), item);
        }
        Ok(())
    }

    /// Swap the item at `old` for `item`, keeping the position
    ///
    /// Children of the old item are dropped.
    pub fn replace(&mut self, old: &ItemKey, mut item: DocumentItem) -> Result<(), TreeError> {
        if !self.items.contains_key(old) {
            return Err(TreeError::item_not_found(old));
        }
        let new_key = item.key();
        // a stale copy of the new key goes first, with its descendants
        if &new_key != old {
            self.remove(&new_key);
        }

        let position = self
            .position(old)
            .ok_or_else(|| TreeError::item_not_found(old))?;
        self.clear_children(old);
        self.items.remove(old);

        item.parent = position.parent.clone();
        item.children.clear();
        self.siblings_mut(position.parent.as_ref())[position.index] = new_key.clone();
        self.items.insert(new_key, item);
        Ok(())
    }

    /// Replace the whole root list
    pub fn replace_roots(&mut self, items: Vec<DocumentItem>) {
        self.roots.clear();
        self.items.clear();
        for mut item in items {
            let key = item.key();
            item.parent = None;
            if !self.items.contains_key(&key) {
                self.roots.push(key.clone());
            }
            self.items.insert(key, item);
        }
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.items.clear();
        self.has_more = false;
        self.loading_roots = false;
    }

    /// Indented text outline of the visible tree
    pub fn outline(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for key in &self.roots {
            self.outline_into(key, 0, &mut lines);
        }
        if self.has_more {
            lines.push("…more".to_string());
        }
        lines
    }

    fn outline_into(&self, key: &ItemKey, depth: usize, lines: &mut Vec<String>) {
        if let Some(item) = self.items.get(key) {
            lines.push(format!(
                "{}{} {} [{}]",
                "  ".repeat(depth),
                item.rendered.disclosure.glyph(),
                item.rendered.label,
                key
            ));
            for child in &item.children {
                self.outline_into(child, depth + 1, lines);
            }
        }
    }

    fn siblings_mut(&mut self, parent: Option<&ItemKey>) -> &mut Vec<ItemKey> {
        match parent {
            None => &mut self.roots,
            Some(key) => match self.items.get_mut(key) {
                Some(item) => &mut item.children,
                // callers verify the parent exists first
                None => &mut self.roots,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;
    use crate::view::render::DefaultRenderer;

    fn item(node_type: NodeType, id: &str, parent: Option<&str>) -> DocumentItem {
        DocumentItem::render(
            &DefaultRenderer,
            Node::new(id, node_type, id.to_uppercase(), parent.map(Into::into)),
            RenderState::default(),
            node_type != NodeType::Measurement,
        )
        .unwrap()
    }

    fn project(id: &str) -> ItemKey {
        ItemKey::new(NodeType::Project, id)
    }

    fn location(id: &str) -> ItemKey {
        ItemKey::new(NodeType::Location, id)
    }

    fn sample() -> TreeDocument {
        let mut doc = TreeDocument::new();
        doc.replace_roots(vec![
            item(NodeType::Project, "p1", None),
            item(NodeType::Project, "p2", None),
        ]);
        for id in ["l1", "l2", "l3"] {
            doc.append(Some(&project("p1")), item(NodeType::Location, id, Some("p1")))
                .unwrap();
        }
        doc.append(
            Some(&location("l2")),
            item(NodeType::Measurement, "m1", Some("l2")),
        )
        .unwrap();
        doc
    }

    #[test]
    fn test_position_reports_neighbours() {
        let doc = sample();
        let pos = doc.position(&location("l2")).unwrap();
        assert_eq!(pos.parent, Some(project("p1")));
        assert_eq!(pos.index, 1);
        assert_eq!(pos.prev, Some(location("l1")));
        assert_eq!(pos.next, Some(location("l3")));
    }

    #[test]
    fn test_remove_and_restore_round_trip() {
        let mut doc = sample();
        let before = doc.clone();

        let removed = doc.remove(&location("l2")).unwrap();
        assert_eq!(removed.items.len(), 2);
        assert!(!doc.contains(&ItemKey::new(NodeType::Measurement, "m1")));
        assert_eq!(doc.children(Some(&project("p1"))), &[location("l1"), location("l3")]);

        doc.restore(removed).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn test_restore_anchors_on_next_when_prev_is_gone() {
        let mut doc = sample();
        let removed = doc.remove(&location("l2")).unwrap();
        doc.remove(&location("l1")).unwrap();

        doc.restore(removed).unwrap();
        assert_eq!(doc.children(Some(&project("p1"))), &[location("l2"), location("l3")]);
    }

    #[test]
    fn test_insert_under_missing_parent_fails() {
        let mut doc = sample();
        let err = doc
            .append(Some(&project("p9")), item(NodeType::Location, "l9", Some("p9")))
            .unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut doc = sample();
        doc.replace(&location("l2"), item(NodeType::Location, "42", Some("p1")))
            .unwrap();

        assert_eq!(
            doc.children(Some(&project("p1"))),
            &[location("l1"), location("42"), location("l3")]
        );
        assert!(!doc.contains(&location("l2")));
        assert!(!doc.contains(&ItemKey::new(NodeType::Measurement, "m1")));
        assert_eq!(doc.get(&location("42")).unwrap().parent, Some(project("p1")));
    }

    #[test]
    fn test_replace_onto_rendered_key_keeps_placeholder_slot() {
        let mut doc = sample();

        // l2 is already rendered before l3, with m1 below it
        doc.replace(&location("l3"), item(NodeType::Location, "l2", Some("p1")))
            .unwrap();

        assert_eq!(
            doc.children(Some(&project("p1"))),
            &[location("l1"), location("l2")]
        );
        assert!(!doc.contains(&ItemKey::new(NodeType::Measurement, "m1")));
        assert!(doc.get(&location("l2")).unwrap().children.is_empty());
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn test_removed_subtree_root_is_first_item() {
        let mut doc = sample();
        let mut removed = doc.remove(&location("l2")).unwrap();
        let root = removed.root_mut().unwrap();
        assert_eq!(root.key(), location("l2"));
        root.state.removing = true;
        doc.restore(removed).unwrap();
        assert!(doc.get(&location("l2")).unwrap().state.removing);
    }

    #[test]
    fn test_clear_children_keeps_item() {
        let mut doc = sample();
        let removed = doc.clear_children(&project("p1"));
        assert_eq!(removed.len(), 4);
        assert!(doc.contains(&project("p1")));
        assert!(doc.children(Some(&project("p1"))).is_empty());
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_outline() {
        let doc = sample();
        let outline = doc.outline();
        assert_eq!(outline[0], "▸ P1 [project:p1]");
        assert_eq!(outline[3], "      M1 [measurement:m1]");
        assert_eq!(outline.len(), 6);
    }
}
