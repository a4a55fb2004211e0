//! Expansion and load state of the tree
//!
//! `TreeState` is stored in the [`ObservableStore`](super::ObservableStore)
//! under [`TreeStateKey`] and only changes through [`TreeStateAction`].

use crate::models::{ItemKey, NodeId, NodeType};
use crate::state::{Reducer, StateKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which nodes are open and which have had their children fetched
///
/// An id may only be in `expanded` once it is in `loaded` or a load for it
/// is in flight. Empty per-type sets are dropped so that states compare
/// equal after an expand/collapse round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeState {
    pub expanded: BTreeMap<NodeType, BTreeSet<NodeId>>,
    pub loaded: BTreeMap<NodeType, BTreeSet<NodeId>>,
}

impl TreeState {
    pub fn is_expanded(&self, key: &ItemKey) -> bool {
        contains(&self.expanded, key)
    }

    pub fn is_loaded(&self, key: &ItemKey) -> bool {
        contains(&self.loaded, key)
    }

    /// Every expanded node, parents' types before children's types
    pub fn expanded_keys(&self) -> Vec<ItemKey> {
        self.expanded
            .iter()
            .flat_map(|(node_type, ids)| ids.iter().map(|id| ItemKey::new(*node_type, id.clone())))
            .collect()
    }
}

fn contains(map: &BTreeMap<NodeType, BTreeSet<NodeId>>, key: &ItemKey) -> bool {
    map.get(&key.node_type)
        .map(|ids| ids.contains(&key.id))
        .unwrap_or(false)
}

fn insert(map: &mut BTreeMap<NodeType, BTreeSet<NodeId>>, key: &ItemKey) {
    map.entry(key.node_type).or_default().insert(key.id.clone());
}

fn remove(map: &mut BTreeMap<NodeType, BTreeSet<NodeId>>, key: &ItemKey) {
    if let Some(ids) = map.get_mut(&key.node_type) {
        ids.remove(&key.id);
        if ids.is_empty() {
            map.remove(&key.node_type);
        }
    }
}

/// Transitions of [`TreeState`]
#[derive(Debug, Clone, PartialEq)]
pub enum TreeStateAction {
    Expand(ItemKey),
    Collapse(ItemKey),
    /// Children were fetched successfully at least once
    MarkLoaded(ItemKey),
    /// The node was deleted or refreshed away
    Forget(ItemKey),
    Reset,
}

impl Reducer<TreeState> for TreeStateAction {
    fn reduce(self, state: &mut TreeState) {
        match self {
            TreeStateAction::Expand(key) => insert(&mut state.expanded, &key),
            TreeStateAction::Collapse(key) => remove(&mut state.expanded, &key),
            TreeStateAction::MarkLoaded(key) => insert(&mut state.loaded, &key),
            TreeStateAction::Forget(key) => {
                remove(&mut state.expanded, &key);
                remove(&mut state.loaded, &key);
            }
            TreeStateAction::Reset => *state = TreeState::default(),
        }
    }
}

/// Store key holding the [`TreeState`]
pub struct TreeStateKey;

impl StateKey for TreeStateKey {
    type Value = TreeState;
    const NAME: &'static str = "tree-state";
}
