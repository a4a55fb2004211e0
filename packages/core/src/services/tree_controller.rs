//! Lazy-loading tree controller
//!
//! Owns the [`NodeCache`] and drives the [`TreeState`] held in the store.
//! Children are fetched the first time a node is expanded and served from
//! the cache afterwards; root nodes are paginated and filterable.
//!
//! # Expansion
//!
//! Each rendered item carries a [`NodePhase`]:
//!
//! ```text
//! Collapsed ──toggle──▶ Expanding ──children rendered──▶ Expanded
//!     ▲                                                      │
//!     └──────── animation elapsed ◀── Collapsing ◀──toggle───┘
//! ```
//!
//! Toggles on an item that is mid-transition or has a load in flight are
//! dropped, which serialises expansion per node. Different nodes load
//! concurrently.
//!
//! # Cleanup
//!
//! The loading flag of a parent is cleared by a drop guard, so it is reset
//! on every exit path of [`TreeController::load_node_children`].

use crate::behaviors::NodeTypeRegistry;
use crate::config::DashboardConfig;
use crate::models::{ItemKey, Node, NodeId, NodePage, NodeType, ValidationError};
use crate::services::data_service::{DataService, ListQuery};
use crate::services::error::TreeError;
use crate::services::events::{EventBus, TreeEvent, UiEvent};
use crate::services::node_cache::{CacheStats, CachedChildren, NodeCache};
use crate::services::notifier::{Notification, Notifier};
use crate::state::{ObservableStore, TreeState, TreeStateAction, TreeStateKey};
use crate::view::{DocumentItem, NodePhase, RenderState, TreeView};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Paging position of the root list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Offset of the next page to request
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    pub filter: Option<String>,
}

/// Entries of the `loading` set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LoadKey {
    Node(ItemKey),
    /// Next root page
    More,
}

#[derive(Default)]
struct TreeInner {
    cache: NodeCache,
    loading: HashSet<LoadKey>,
    pagination: Pagination,
    /// Bumped by every refresh; stale root responses are discarded
    generation: u64,
    debounce: Option<JoinHandle<()>>,
}

/// Clears a `loading` entry and its indicator when dropped
struct LoadingGuard<'a> {
    controller: &'a TreeController,
    key: LoadKey,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.controller.finish_loading(&self.key);
    }
}

pub struct TreeController {
    data: Arc<dyn DataService>,
    registry: Arc<NodeTypeRegistry>,
    store: Arc<ObservableStore>,
    view: Arc<TreeView>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    config: DashboardConfig,
    root_type: NodeType,
    inner: Mutex<TreeInner>,
}

impl TreeController {
    pub fn new(
        data: Arc<dyn DataService>,
        registry: Arc<NodeTypeRegistry>,
        store: Arc<ObservableStore>,
        view: Arc<TreeView>,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
        config: DashboardConfig,
    ) -> Self {
        let root_type = registry
            .root_types()
            .first()
            .copied()
            .unwrap_or(NodeType::Project);
        let inner = TreeInner {
            pagination: Pagination {
                limit: config.page_size,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            data,
            registry,
            store,
            view,
            events,
            notifier,
            config,
            root_type,
            inner: Mutex::new(inner),
        }
    }

    pub fn view(&self) -> &Arc<TreeView> {
        &self.view
    }

    pub fn pagination(&self) -> Pagination {
        self.lock().pagination.clone()
    }

    /// Children of `key` are being fetched
    pub fn is_loading(&self, key: &ItemKey) -> bool {
        self.lock().loading.contains(&LoadKey::Node(key.clone()))
    }

    pub fn is_loading_more(&self) -> bool {
        self.lock().loading.contains(&LoadKey::More)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().cache.stats()
    }

    pub fn cached(&self, key: &ItemKey) -> Option<Node> {
        self.lock().cache.get(key).cloned()
    }

    pub fn tree_state(&self) -> TreeState {
        self.store.get::<TreeStateKey>().unwrap_or_default()
    }

    /// Expand a collapsed node or collapse an expanded one
    ///
    /// Dropped while the node is loading or mid-transition.
    pub async fn toggle_node(&self, key: &ItemKey) -> Result<(), TreeError> {
        if self.is_loading(key) {
            tracing::debug!("Ignoring toggle of {}: children are loading", key);
            return Ok(());
        }

        let item = self
            .view
            .item(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;

        match item.state.phase {
            phase if phase.is_transitioning() => {
                tracing::debug!("Ignoring toggle of {}: transition in progress", key);
                Ok(())
            }
            NodePhase::Expanded => self.collapse_node(key).await,
            _ if item.can_have_children => self.expand_node(key).await,
            _ => Ok(()),
        }
    }

    /// Show the children of a node, loading them if necessary
    ///
    /// Descendants that were expanded before an ancestor collapsed are
    /// expanded again, so the rendered tree matches the tree state.
    pub async fn expand_node(&self, key: &ItemKey) -> Result<(), TreeError> {
        self.expand_single(key).await?;

        let mut pending = vec![key.clone()];
        while let Some(parent) = pending.pop() {
            let expanded = self.tree_state();
            for child in self.view.child_keys(Some(&parent)) {
                if !expanded.is_expanded(&child) {
                    continue;
                }
                match self.expand_single(&child).await {
                    Ok(()) => pending.push(child),
                    Err(e) => tracing::debug!("Could not re-expand {}: {}", child, e),
                }
            }
        }
        Ok(())
    }

    async fn expand_single(&self, key: &ItemKey) -> Result<(), TreeError> {
        let item = self
            .view
            .item(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;
        if !item.can_have_children {
            return Err(ValidationError::ChildrenNotSupported(key.node_type.to_string()).into());
        }
        if item.state.phase != NodePhase::Collapsed {
            return Ok(());
        }

        self.view.update_state(key, |state| {
            state.phase = NodePhase::Expanding;
            state.loading = true;
        })?;

        match self.load_node_children(key.node_type, &key.id).await {
            Ok(_) => {
                self.view.update_state(key, |state| {
                    state.phase = NodePhase::Expanded;
                    state.loading = false;
                })?;
                self.store
                    .dispatch::<TreeStateKey, _>(TreeStateAction::Expand(key.clone()))?;
                self.events.emit(TreeEvent::StateChange {
                    key: key.clone(),
                    expanded: true,
                });
                Ok(())
            }
            Err(err) => {
                // the item may have been removed while loading
                let _ = self.view.update_state(key, |state| {
                    state.phase = NodePhase::Collapsed;
                    state.loading = false;
                });
                tracing::warn!("Failed to expand {}: {}", key, err);
                self.notifier.notify(Notification::error(
                    format!("Could not load children of {}: {}", key, err),
                    err.is_retryable(),
                ));
                Err(err)
            }
        }
    }

    /// Hide the children of a node after the collapse animation
    pub async fn collapse_node(&self, key: &ItemKey) -> Result<(), TreeError> {
        let item = self
            .view
            .item(key)
            .ok_or_else(|| TreeError::item_not_found(key))?;
        if item.state.phase != NodePhase::Expanded {
            return Ok(());
        }

        self.view
            .update_state(key, |state| state.phase = NodePhase::Collapsing)?;
        tokio::time::sleep(self.config.animation()).await;

        if self.view.contains(key) {
            self.view.write(|doc| doc.clear_children(key));
            self.view
                .update_state(key, |state| state.phase = NodePhase::Collapsed)?;
        }
        self.store
            .dispatch::<TreeStateKey, _>(TreeStateAction::Collapse(key.clone()))?;
        self.events.emit(TreeEvent::StateChange {
            key: key.clone(),
            expanded: false,
        });
        Ok(())
    }

    /// Render the children of a node from the cache or the backend
    ///
    /// Returns the number of children rendered. A call while the same
    /// parent is already loading is a no-op returning `0`. Children that
    /// fail to render are reported and skipped; their siblings are kept.
    pub async fn load_node_children(
        &self,
        parent_type: NodeType,
        parent_id: &NodeId,
    ) -> Result<usize, TreeError> {
        let parent = ItemKey::new(parent_type, parent_id.clone());
        let child_type = self
            .registry
            .child_type(parent_type)
            .ok_or_else(|| ValidationError::ChildrenNotSupported(parent_type.to_string()))?;
        if !self.view.contains(&parent) {
            return Err(TreeError::item_not_found(&parent));
        }

        let Some(_guard) = self.begin_loading(LoadKey::Node(parent.clone())) else {
            tracing::debug!("Children of {} are already loading", parent);
            return Ok(0);
        };
        let _ = self.view.update_state(&parent, |state| state.loading = true);

        let cached = self
            .lock()
            .cache
            .get_children(&self.registry, parent_type, parent_id);

        let (children, from_cache) = match cached {
            CachedChildren::Populated(nodes) => {
                tracing::debug!("Cache hit for children of {} ({} nodes)", parent, nodes.len());
                (nodes, true)
            }
            CachedChildren::Empty | CachedChildren::NotFetched => {
                let query = ListQuery::default().with_ordering(self.config.ordering.clone());
                let page = self
                    .registry
                    .fetch_children(self.data.as_ref(), parent_type, parent_id, &query)
                    .await?;
                self.report_rejected(child_type, &page);

                self.lock()
                    .cache
                    .store(child_type, Some(&parent), page.nodes.clone());
                self.store
                    .dispatch::<TreeStateKey, _>(TreeStateAction::MarkLoaded(parent.clone()))?;
                (page.nodes, false)
            }
        };

        let count = self.render_children(&parent, children)?;
        self.events.emit(TreeEvent::NodeLoad {
            parent,
            count,
            from_cache,
        });
        Ok(count)
    }

    /// Re-fetch the first root page and restore previously expanded nodes
    pub async fn refresh_tree(&self, filter: Option<String>) -> Result<usize, TreeError> {
        let (query, generation) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.pagination.offset = 0;
            inner.pagination.filter = filter.filter(|f| !f.trim().is_empty());
            let query = ListQuery::page(0, inner.pagination.limit)
                .with_filter(inner.pagination.filter.clone())
                .with_ordering(self.config.ordering.clone());
            (query, inner.generation)
        };
        self.view.write(|doc| doc.loading_roots = true);

        let page = match self.fetch_roots(&query).await {
            Ok(page) => page,
            Err(err) => {
                self.view.write(|doc| doc.loading_roots = false);
                tracing::warn!("Failed to refresh tree: {}", err);
                self.notifier.notify(Notification::error(
                    format!("Could not load {}s: {}", self.root_type, err),
                    err.is_retryable(),
                ));
                return Err(err);
            }
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                tracing::debug!("Discarding stale root page (generation {})", generation);
                return Ok(0);
            }
            inner.pagination.offset = query.limit;
            inner.pagination.has_more = page.has_more;
            inner.cache.store(self.root_type, None, page.nodes.clone());
        }

        let items = self.render_items(page.nodes);
        let root_count = items.len();
        self.view.write(|doc| {
            doc.replace_roots(items);
            doc.has_more = page.has_more;
            doc.loading_roots = false;
        });

        self.restore_expanded().await;

        tracing::info!(
            "Rendered {} root {}(s), has_more={}",
            root_count,
            self.root_type,
            page.has_more
        );
        self.events.emit(TreeEvent::Render {
            root_count,
            has_more: page.has_more,
        });
        Ok(root_count)
    }

    /// Append the next root page
    ///
    /// No-op when there are no more pages or one is already loading.
    pub async fn load_more(&self) -> Result<usize, TreeError> {
        if !self.lock().pagination.has_more {
            return Ok(0);
        }
        let Some(_guard) = self.begin_loading(LoadKey::More) else {
            tracing::debug!("Next page is already loading");
            return Ok(0);
        };

        let (query, generation) = {
            let inner = self.lock();
            let query = ListQuery::page(inner.pagination.offset, inner.pagination.limit)
                .with_filter(inner.pagination.filter.clone())
                .with_ordering(self.config.ordering.clone());
            (query, inner.generation)
        };
        self.view.write(|doc| doc.loading_roots = true);

        let page = match self.fetch_roots(&query).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!("Failed to load more {}s: {}", self.root_type, err);
                self.notifier
                    .notify(Notification::error(err.to_string(), err.is_retryable()));
                return Err(err);
            }
        };

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                tracing::debug!("Discarding page loaded before a refresh");
                return Ok(0);
            }
            inner.pagination.offset += inner.pagination.limit;
            inner.pagination.has_more = page.has_more;
            inner.cache.store(self.root_type, None, page.nodes.clone());
        }

        let items = self.render_items(page.nodes);
        let count = items.len();
        let root_count = self.view.write(|doc| {
            for item in items {
                // roots have no parent, so appending cannot fail
                let _ = doc.append(None, item);
            }
            doc.has_more = page.has_more;
            doc.roots().len()
        });

        self.events.emit(TreeEvent::Render {
            root_count,
            has_more: page.has_more,
        });
        Ok(count)
    }

    /// The infinite-scroll sentinel is visible
    pub async fn on_sentinel_intersect(&self) -> Result<usize, TreeError> {
        let has_more = self.lock().pagination.has_more;
        if !has_more || self.is_loading_more() {
            return Ok(0);
        }
        self.load_more().await
    }

    /// Debounced filter input; each call restarts the timer
    pub fn set_filter(self: &Arc<Self>, text: impl Into<String>) {
        let text = text.into();
        let delay = self.config.filter_debounce();
        let controller: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = controller.upgrade() {
                if let Err(e) = controller.refresh_tree(Some(text)).await {
                    tracing::debug!("Filtered refresh failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.lock().debounce.replace(task) {
            previous.abort();
        }
    }

    /// Purge a deleted node from cache, state and document
    pub fn cleanup_node(&self, key: &ItemKey) -> Result<(), TreeError> {
        let evicted = {
            let mut inner = self.lock();
            inner.loading.remove(&LoadKey::Node(key.clone()));
            inner.cache.evict(&self.registry, key.node_type, &key.id)
        };
        self.store
            .dispatch::<TreeStateKey, _>(TreeStateAction::Forget(key.clone()))?;
        self.view.write(|doc| doc.remove(key));
        tracing::debug!("Cleaned up {} ({} cached node(s) evicted)", key, evicted);
        Ok(())
    }

    /// React to events published by the CRUD controller
    pub fn handle_event(&self, event: &UiEvent) {
        match &event.event {
            TreeEvent::NodeCleanup { key } => {
                if let Err(e) = self.cleanup_node(key) {
                    tracing::warn!("Cleanup of {} failed: {}", key, e);
                }
            }
            TreeEvent::NodeAdd { node, .. } | TreeEvent::NodeEdit { node } => {
                self.remember(node.clone());
            }
            _ => {}
        }
    }

    /// Consume events until the bus closes
    pub fn listen(self: &Arc<Self>, mut rx: broadcast::Receiver<UiEvent>) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match controller.upgrade() {
                        Some(controller) => controller.handle_event(&event),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Tree listener lagged, {} event(s) skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Tear the tree down
    pub fn destroy(&self) {
        {
            let mut inner = self.lock();
            if let Some(debounce) = inner.debounce.take() {
                debounce.abort();
            }
            inner.cache.clear();
            inner.loading.clear();
            inner.generation += 1;
            inner.pagination = Pagination {
                limit: self.config.page_size,
                ..Default::default()
            };
        }
        self.view.write(|doc| doc.clear());
        if let Err(e) = self.store.dispatch::<TreeStateKey, _>(TreeStateAction::Reset) {
            tracing::debug!("Tree state not reset: {}", e);
        }
        self.events.emit(TreeEvent::Destroy);
    }

    /// Keep a created or edited node in the cache
    ///
    /// Children of parents that were never fetched are not cached, or the
    /// parent's next expansion would be served from an incomplete list.
    fn remember(&self, node: Node) {
        let mut inner = self.lock();
        let parent_fetched = match (&node.parent_id, self.registry.parent_type(node.node_type)) {
            (Some(parent_id), Some(parent_type)) => inner
                .cache
                .is_fetched(&ItemKey::new(parent_type, parent_id.clone())),
            _ => true,
        };
        if parent_fetched || inner.cache.contains(&node.key()) {
            inner.cache.upsert(node);
        }
    }

    async fn fetch_roots(&self, query: &ListQuery) -> Result<NodePage, TreeError> {
        let payload = self.data.list(self.root_type, query).await?;
        let page = NodePage::from_response(payload, self.root_type, None)?;
        self.report_rejected(self.root_type, &page);
        Ok(page)
    }

    async fn restore_expanded(&self) {
        for key in self.tree_state().expanded_keys() {
            if !self.view.contains(&key) {
                continue;
            }
            if let Err(e) = self.expand_node(&key).await {
                tracing::debug!("Could not restore expansion of {}: {}", key, e);
            }
        }
    }

    fn render_children(&self, parent: &ItemKey, children: Vec<Node>) -> Result<usize, TreeError> {
        let items = self.render_items(children);
        self.view.write(|doc| -> Result<usize, TreeError> {
            doc.clear_children(parent);
            let mut count = 0;
            for item in items {
                doc.append(Some(parent), item)?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Render nodes, reporting and skipping the ones that fail
    fn render_items(&self, nodes: Vec<Node>) -> Vec<DocumentItem> {
        nodes
            .into_iter()
            .filter_map(|node| {
                let key = node.key();
                let can_have_children = self.registry.can_have_children(node.node_type);
                match self
                    .view
                    .render(node, RenderState::default(), can_have_children)
                {
                    Ok(item) => Some(item),
                    Err(e) => {
                        tracing::warn!("Failed to render {}: {}", key, e);
                        self.notifier
                            .notify(Notification::error(format!("Could not display {}", key), false));
                        None
                    }
                }
            })
            .collect()
    }

    fn report_rejected(&self, node_type: NodeType, page: &NodePage) {
        if !page.rejected.is_empty() {
            self.notifier.notify(Notification::error(
                format!("{} malformed {} record(s) skipped", page.rejected.len(), node_type),
                false,
            ));
        }
    }

    fn begin_loading(&self, key: LoadKey) -> Option<LoadingGuard<'_>> {
        if self.lock().loading.insert(key.clone()) {
            Some(LoadingGuard {
                controller: self,
                key,
            })
        } else {
            None
        }
    }

    fn finish_loading(&self, key: &LoadKey) {
        self.lock().loading.remove(key);
        match key {
            LoadKey::Node(item) => {
                let _ = self.view.update_state(item, |state| state.loading = false);
            }
            LoadKey::More => self.view.write(|doc| doc.loading_roots = false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TreeController {
    fn drop(&mut self) {
        if let Some(debounce) = self.lock().debounce.take() {
            debounce.abort();
        }
    }
}

#[cfg(test)]
#[path = "tree_controller_test.rs"]
mod tree_controller_test;
