//! Observable keyed state store
//!
//! The store maps typed keys to state values and notifies subscribers
//! synchronously after every write. Keys are zero-sized marker types
//! implementing [`StateKey`], so reading the tree state always yields a
//! `TreeState` and never an untyped blob.
//!
//! # Lifecycle
//!
//! Writes are only accepted between [`ObservableStore::init`] and
//! [`ObservableStore::teardown`]. Reads outside that window return `None`.
//!
//! # Notifications
//!
//! Subscribers of a key run in registration order after each `set`/`update`
//! on that key, with `(new, old)` values. Redundant writes are not
//! suppressed; subscribers compare values themselves. Callbacks run after
//! the store lock is released, so a callback may read the store; a callback
//! that writes the key it observes recurses.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// A typed key into the [`ObservableStore`]
pub trait StateKey: 'static {
    type Value: Clone + Default + Send + Sync + 'static;

    /// Human-readable key name for logs and errors
    const NAME: &'static str;
}

/// Explicit state transition applied through [`ObservableStore::dispatch`]
pub trait Reducer<V> {
    fn reduce(self, state: &mut V);
}

/// Errors raised by store writes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("State store is not initialized (write to '{key}')")]
    NotInitialized { key: &'static str },
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&dyn Any, &dyn Any) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    initialized: bool,
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    subscribers: HashMap<TypeId, Vec<(SubscriptionId, Callback)>>,
    next_subscription: u64,
}

/// Keyed state with synchronous change notification
#[derive(Default)]
pub struct ObservableStore {
    inner: Mutex<StoreInner>,
}

impl ObservableStore {
    /// Create an uninitialized store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already accepts writes
    pub fn initialized() -> Self {
        let store = Self::new();
        store.init();
        store
    }

    pub fn init(&self) {
        self.lock().initialized = true;
        tracing::debug!("State store initialized");
    }

    /// Drop all values and subscribers and stop accepting writes
    pub fn teardown(&self) {
        let mut inner = self.lock();
        inner.initialized = false;
        inner.values.clear();
        inner.subscribers.clear();
        tracing::debug!("State store torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Current value of `K`, if one was ever written
    pub fn get<K: StateKey>(&self) -> Option<K::Value> {
        self.lock()
            .values
            .get(&TypeId::of::<K>())
            .and_then(|value| value.downcast_ref::<K::Value>())
            .cloned()
    }

    /// Replace the value of `K` unconditionally
    pub fn set<K: StateKey>(&self, value: K::Value) -> Result<(), StoreError> {
        self.write::<K, _>(move |slot| *slot = value).map(|_| ())
    }

    /// Apply `reducer` to the value of `K`, creating the default if absent
    ///
    /// Returns the new value.
    pub fn update<K: StateKey>(
        &self,
        reducer: impl FnOnce(&mut K::Value),
    ) -> Result<K::Value, StoreError> {
        self.write::<K, _>(reducer)
    }

    /// Apply a typed [`Reducer`] to the value of `K`
    pub fn dispatch<K, R>(&self, action: R) -> Result<K::Value, StoreError>
    where
        K: StateKey,
        R: Reducer<K::Value>,
    {
        self.write::<K, _>(move |state| action.reduce(state))
    }

    /// Register a callback invoked with `(new, old)` after each write to `K`
    pub fn subscribe<K, F>(&self, callback: F) -> SubscriptionId
    where
        K: StateKey,
        F: Fn(&K::Value, &K::Value) + Send + Sync + 'static,
    {
        let erased: Callback = Arc::new(move |new: &dyn Any, old: &dyn Any| {
            if let (Some(new), Some(old)) = (
                new.downcast_ref::<K::Value>(),
                old.downcast_ref::<K::Value>(),
            ) {
                callback(new, old);
            }
        });

        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner
            .subscribers
            .entry(TypeId::of::<K>())
            .or_default()
            .push((id, erased));
        id
    }

    /// Remove a subscription; returns false when it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        for callbacks in inner.subscribers.values_mut() {
            if let Some(pos) = callbacks.iter().position(|(sub, _)| *sub == id) {
                callbacks.remove(pos);
                return true;
            }
        }
        false
    }

    fn write<K, F>(&self, mutate: F) -> Result<K::Value, StoreError>
    where
        K: StateKey,
        F: FnOnce(&mut K::Value),
    {
        let (new, old, callbacks) = {
            let mut inner = self.lock();
            if !inner.initialized {
                return Err(StoreError::NotInitialized { key: K::NAME });
            }

            let slot = inner
                .values
                .entry(TypeId::of::<K>())
                .or_insert_with(|| Box::new(K::Value::default()));

            // Values are keyed by TypeId::of::<K>() and only ever written as K::Value
            let value = slot
                .downcast_mut::<K::Value>()
                .expect("state slot holds the key's value type");

            let old = value.clone();
            mutate(value);
            let new = value.clone();

            let callbacks: Vec<Callback> = inner
                .subscribers
                .get(&TypeId::of::<K>())
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default();

            (new, old, callbacks)
        };

        for callback in callbacks {
            callback(&new, &old);
        }

        Ok(new)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
