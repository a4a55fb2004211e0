//! Rendered view of the tree
//!
//! - `render` - the pure `NodeRenderer` and the per-item UI state
//! - `document` - `TreeDocument`, the ordered model of rendered items
//!
//! [`TreeView`] pairs a document with its renderer and is shared by the tree
//! and CRUD controllers the way both would share one DOM subtree. Access is
//! closure-scoped so no lock is ever held across an `.await`.

mod document;
mod render;

pub use document::{DocumentItem, Position, RemovedSubtree, TreeDocument};
pub use render::{
    DefaultRenderer, Disclosure, NodePhase, NodeRenderer, RenderState, RenderedItem,
};

use crate::models::{ItemKey, Node};
use crate::services::error::TreeError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared, renderer-aware handle on a [`TreeDocument`]
pub struct TreeView {
    document: Mutex<TreeDocument>,
    renderer: Arc<dyn NodeRenderer>,
}

impl Default for TreeView {
    fn default() -> Self {
        Self::new(Arc::new(DefaultRenderer))
    }
}

impl TreeView {
    pub fn new(renderer: Arc<dyn NodeRenderer>) -> Self {
        Self {
            document: Mutex::new(TreeDocument::new()),
            renderer,
        }
    }

    pub fn renderer(&self) -> &dyn NodeRenderer {
        self.renderer.as_ref()
    }

    /// Render a detached item
    pub fn render(
        &self,
        node: Node,
        state: RenderState,
        can_have_children: bool,
    ) -> Result<DocumentItem, TreeError> {
        DocumentItem::render(self.renderer.as_ref(), node, state, can_have_children)
    }

    /// Run `f` against the document
    pub fn read<R>(&self, f: impl FnOnce(&TreeDocument) -> R) -> R {
        f(&self.lock())
    }

    /// Run `f` against the mutable document
    pub fn write<R>(&self, f: impl FnOnce(&mut TreeDocument) -> R) -> R {
        f(&mut self.lock())
    }

    /// Clone of the whole document
    pub fn snapshot(&self) -> TreeDocument {
        self.lock().clone()
    }

    pub fn item(&self, key: &ItemKey) -> Option<DocumentItem> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.lock().contains(key)
    }

    pub fn child_keys(&self, parent: Option<&ItemKey>) -> Vec<ItemKey> {
        self.lock().children(parent).to_vec()
    }

    /// Mutate an item's UI state and re-render it
    pub fn update_state(
        &self,
        key: &ItemKey,
        f: impl FnOnce(&mut RenderState),
    ) -> Result<(), TreeError> {
        let mut document = self.lock();
        let item = document
            .get_mut(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;
        f(&mut item.state);
        item.rerender(self.renderer.as_ref())
    }

    /// Replace an item's node data and re-render it
    pub fn update_node(&self, key: &ItemKey, node: Node) -> Result<(), TreeError> {
        let mut document = self.lock();
        let item = document
            .get_mut(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;
        item.node = node;
        item.rerender(self.renderer.as_ref())
    }

    /// Replace both node data and UI state, then re-render
    pub fn set_item(&self, key: &ItemKey, node: Node, state: RenderState) -> Result<(), TreeError> {
        let mut document = self.lock();
        let item = document
            .get_mut(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;
        item.node = node;
        item.state = state;
        item.rerender(self.renderer.as_ref())
    }

    pub fn outline(&self) -> Vec<String> {
        self.lock().outline()
    }

    fn lock(&self) -> MutexGuard<'_, TreeDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
