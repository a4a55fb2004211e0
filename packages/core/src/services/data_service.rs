//! Remote data access contract
//!
//! The tree and CRUD controllers never talk HTTP themselves; they consume a
//! [`DataService`]. A REST binding implements it in the host application,
//! [`InMemoryDataService`](super::InMemoryDataService) implements it for
//! tests and the dev session.
//!
//! List calls return the raw JSON payload because the backend answers in
//! several envelope shapes; callers normalise it with
//! [`NodePage::from_response`](crate::models::NodePage::from_response).

use crate::models::{NodeId, NodeRecord, NodeType};
use crate::services::error::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pagination, filtering and ordering of a list request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

impl ListQuery {
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_ordering(mut self, ordering: Option<String>) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Remote CRUD and pagination for tree nodes
///
/// All calls may fail with a [`RemoteError`] carrying an HTTP-like status.
#[async_trait]
pub trait DataService: Send + Sync {
    /// List root-level nodes of `node_type`
    async fn list(&self, node_type: NodeType, query: &ListQuery) -> Result<Value, RemoteError>;

    /// List nodes of `child_type` owned by `parent_id`
    async fn get_children(
        &self,
        child_type: NodeType,
        parent_id: &NodeId,
        query: &ListQuery,
    ) -> Result<Value, RemoteError>;

    /// Create a node; the response carries the server-assigned id
    async fn create(
        &self,
        node_type: NodeType,
        data: Map<String, Value>,
    ) -> Result<NodeRecord, RemoteError>;

    /// Partially update a node
    async fn update(
        &self,
        node_type: NodeType,
        id: &NodeId,
        data: Map<String, Value>,
    ) -> Result<NodeRecord, RemoteError>;

    async fn delete(&self, node_type: NodeType, id: &NodeId) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_query_serialization() {
        let query = ListQuery::page(20, 10)
            .with_filter(Some("north".to_string()))
            .with_ordering(Some("name".to_string()));

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"offset": 20, "limit": 10, "filter": "north", "ordering": "name"})
        );
    }

    #[test]
    fn test_blank_filter_is_dropped() {
        let query = ListQuery::page(0, 10).with_filter(Some("   ".to_string()));
        assert_eq!(query.filter, None);
    }
}
