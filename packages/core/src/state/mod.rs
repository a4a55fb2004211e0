//! Observable application state
//!
//! - `ObservableStore` - typed keyed state with change subscriptions
//! - `TreeState` - expansion/load bookkeeping of the tree, with its reducer

mod store;
mod tree_state;

pub use store::{ObservableStore, Reducer, StateKey, StoreError, SubscriptionId};
pub use tree_state::{TreeState, TreeStateAction, TreeStateKey};
