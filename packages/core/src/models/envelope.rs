//! Response Envelope Normalization
//!
//! The backend answers list requests in four shapes depending on the
//! endpoint that served them:
//!
//! - a bare array: `[{...}, {...}]`
//! - a paginated page: `{"results": [...], "next": "..."}`
//! - a data envelope: `{"data": [...]}`
//! - the tree envelope: `{"nodes": [...], "hasMore": true}`
//!
//! All four normalise to one [`NodePage`]. Records that cannot be turned
//! into a [`Node`] are collected in `rejected` instead of failing the page,
//! so one malformed entry never hides the rest.

use crate::models::{Node, NodeId, NodeRecord, NodeType};
use crate::services::error::RemoteError;
use serde_json::Value;

/// Keys that may hold the record array, in lookup order
const ENVELOPE_KEYS: [&str; 3] = ["results", "data", "nodes"];

/// A normalised page of nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePage {
    pub nodes: Vec<Node>,
    pub has_more: bool,
    /// Records skipped during normalization: (position in payload, reason)
    pub rejected: Vec<(usize, String)>,
}

impl NodePage {
    /// Normalise a raw list payload into nodes of `node_type`
    ///
    /// `parent_id` is stamped on records that do not carry their own parent.
    pub fn from_response(
        payload: Value,
        node_type: NodeType,
        parent_id: Option<&NodeId>,
    ) -> Result<Self, RemoteError> {
        let (items, has_more) = split_envelope(payload)?;

        let mut page = NodePage {
            nodes: Vec::with_capacity(items.len()),
            has_more,
            rejected: Vec::new(),
        };

        for (index, item) in items.into_iter().enumerate() {
            if !item.is_object() {
                page.rejected
                    .push((index, format!("expected object, got {}", item)));
                continue;
            }

            let converted = serde_json::from_value::<NodeRecord>(item)
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    Node::from_record(record, node_type, parent_id).map_err(|e| e.to_string())
                });

            match converted {
                Ok(node) => page.nodes.push(node),
                Err(reason) => {
                    tracing::warn!("Skipping malformed {} record #{}: {}", node_type, index, reason);
                    page.rejected.push((index, reason));
                }
            }
        }

        Ok(page)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Split a payload into its record array and the has-more flag
fn split_envelope(payload: Value) -> Result<(Vec<Value>, bool), RemoteError> {
    match payload {
        Value::Array(items) => Ok((items, false)),
        Value::Object(mut map) => {
            let has_more = match map.get("hasMore").or_else(|| map.get("has_more")) {
                Some(Value::Bool(flag)) => *flag,
                _ => map.get("next").map(|next| !next.is_null()).unwrap_or(false),
            };

            for key in ENVELOPE_KEYS {
                if let Some(value) = map.remove(key) {
                    return match value {
                        Value::Array(items) => Ok((items, has_more)),
                        other => Err(RemoteError::invalid_response(format!(
                            "'{}' must be an array, got {}",
                            key, other
                        ))),
                    };
                }
            }

            Err(RemoteError::invalid_response(
                "object response without results, data or nodes",
            ))
        }
        other => Err(RemoteError::invalid_response(format!(
            "unexpected list payload: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::error::RemoteErrorKind;
    use serde_json::json;

    fn records() -> Value {
        json!([
            {"id": "l1", "name": "Loc A"},
            {"id": 2, "name": "Loc B", "address": "Harbour 3"}
        ])
    }

    #[test]
    fn test_all_envelopes_normalize_identically() {
        let parent = NodeId::from("p1");
        let shapes = vec![
            records(),
            json!({"results": records()}),
            json!({"data": records()}),
            json!({"nodes": records()}),
        ];

        let pages: Vec<NodePage> = shapes
            .into_iter()
            .map(|shape| NodePage::from_response(shape, NodeType::Location, Some(&parent)).unwrap())
            .collect();

        for page in &pages[1..] {
            assert_eq!(page.nodes, pages[0].nodes);
        }

        let ids: Vec<&str> = pages[0].nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "2"]);
        assert!(pages[0]
            .nodes
            .iter()
            .all(|n| n.parent_id == Some(parent.clone())));
    }

    #[test]
    fn test_has_more_sources() {
        let explicit = NodePage::from_response(
            json!({"nodes": [], "hasMore": true}),
            NodeType::Project,
            None,
        )
        .unwrap();
        assert!(explicit.has_more);

        let snake = NodePage::from_response(
            json!({"data": [], "has_more": true}),
            NodeType::Project,
            None,
        )
        .unwrap();
        assert!(snake.has_more);

        let next_link = NodePage::from_response(
            json!({"results": [], "next": "/api/projects/?offset=20"}),
            NodeType::Project,
            None,
        )
        .unwrap();
        assert!(next_link.has_more);

        let last_page = NodePage::from_response(
            json!({"results": [], "next": null}),
            NodeType::Project,
            None,
        )
        .unwrap();
        assert!(!last_page.has_more);
    }

    #[test]
    fn test_malformed_records_are_rejected_individually() {
        let page = NodePage::from_response(
            json!({"nodes": [
                {"id": "p1", "name": "Good"},
                "garbage",
                {"name": "no id"},
                {"id": "p4", "type": "location", "name": "Wrong type"},
                {"id": "p5", "name": "Also good"}
            ]}),
            NodeType::Project,
            None,
        )
        .unwrap();

        let ids: Vec<&str> = page.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p5"]);
        let rejected: Vec<usize> = page.rejected.iter().map(|(i, _)| *i).collect();
        assert_eq!(rejected, vec![1, 2, 3]);
    }

    #[test]
    fn test_unrecognized_shapes_fail() {
        let err = NodePage::from_response(json!({"items": []}), NodeType::Project, None)
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidResponse);

        let err = NodePage::from_response(json!({"data": {"id": 1}}), NodeType::Project, None)
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidResponse);

        let err = NodePage::from_response(json!("nope"), NodeType::Project, None).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidResponse);
    }
}
