//! Dashboard configuration
//!
//! Every knob has a default; hosts override them from a JSON document or
//! from `FIELDTREE_*` environment variables:
//!
//! | Variable                       | Field                | Default |
//! |--------------------------------|----------------------|---------|
//! | `FIELDTREE_PAGE_SIZE`          | `page_size`          | 20      |
//! | `FIELDTREE_FILTER_DEBOUNCE_MS` | `filter_debounce_ms` | 300     |
//! | `FIELDTREE_ANIMATION_MS`       | `animation_ms`       | 200     |
//! | `FIELDTREE_CREATE_TIMEOUT_MS`  | `create_timeout_ms`  | 60000   |
//! | `FIELDTREE_UPDATE_TIMEOUT_MS`  | `update_timeout_ms`  | 60000   |
//! | `FIELDTREE_DELETE_TIMEOUT_MS`  | `delete_timeout_ms`  | 30000   |
//! | `FIELDTREE_MAX_ATTEMPTS`       | `max_attempts`       | 3       |
//! | `FIELDTREE_HISTORY_LIMIT`      | `history_limit`      | 100     |
//! | `FIELDTREE_ORDERING`           | `ordering`           | name    |

use crate::models::OperationKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    /// Root nodes fetched per page
    pub page_size: usize,
    pub filter_debounce_ms: u64,
    /// Duration of the collapse transition
    pub animation_ms: u64,
    pub create_timeout_ms: u64,
    pub update_timeout_ms: u64,
    pub delete_timeout_ms: u64,
    /// Attempts before an operation that keeps timing out fails for good
    pub max_attempts: u32,
    /// Terminal operations kept for stats
    pub history_limit: usize,
    /// Ordering passed to root list requests
    pub ordering: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            filter_debounce_ms: 300,
            animation_ms: 200,
            create_timeout_ms: 60_000,
            update_timeout_ms: 60_000,
            delete_timeout_ms: 30_000,
            max_attempts: 3,
            history_limit: 100,
            ordering: Some("name".to_string()),
        }
    }
}

impl DashboardConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by `FIELDTREE_*` environment variables
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            let raw = lookup(name)?;
            match raw.trim().parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid {}={:?}", name, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "FIELDTREE_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_FILTER_DEBOUNCE_MS") {
            self.filter_debounce_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_ANIMATION_MS") {
            self.animation_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_CREATE_TIMEOUT_MS") {
            self.create_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_UPDATE_TIMEOUT_MS") {
            self.update_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_DELETE_TIMEOUT_MS") {
            self.delete_timeout_ms = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_MAX_ATTEMPTS") {
            self.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "FIELDTREE_HISTORY_LIMIT") {
            self.history_limit = v;
        }
        if let Some(v) = lookup("FIELDTREE_ORDERING") {
            self.ordering = Some(v).filter(|o| !o.trim().is_empty());
        }
        self
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn animation(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }

    /// Deadline of the first attempt of an operation of `kind`
    pub fn timeout_for(&self, kind: OperationKind) -> Duration {
        Duration::from_millis(match kind {
            OperationKind::Create => self.create_timeout_ms,
            OperationKind::Update => self.update_timeout_ms,
            OperationKind::Delete => self.delete_timeout_ms,
        })
    }
}
