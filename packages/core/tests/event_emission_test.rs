//! Event Emission Tests
//!
//! Verifies the events page listeners observe for tree and CRUD activity,
//! their JSON detail payloads, and that the tree controller keeps its cache
//! in sync with CRUD events it receives from the bus.

#[cfg(test)]
mod event_emission_tests {
    use anyhow::Result;
    use fieldtree_core::{
        Dashboard, DashboardConfig, DefaultRenderer, InMemoryDataService, ItemKey, Node,
        NodeType, RecordingNotifier, TreeEvent, UiAction, UiEvent,
    };
    use serde_json::{json, Map};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn dashboard() -> Dashboard {
        let data = Arc::new(InMemoryDataService::with_nodes(vec![
            Node::new("p1", NodeType::Project, "Harbour", None),
            Node::new("l1", NodeType::Location, "Quay", Some("p1".into())),
            Node::new("m7", NodeType::Measurement, "Depth", Some("l1".into())),
        ]));
        Dashboard::with_parts(
            data,
            DashboardConfig::default(),
            Arc::new(RecordingNotifier::new()),
            Arc::new(DefaultRenderer),
        )
    }

    async fn next_event(rx: &mut broadcast::Receiver<UiEvent>) -> Result<UiEvent> {
        Ok(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await??)
    }

    /// Drain events until one of `event_type` arrives
    async fn wait_for(rx: &mut broadcast::Receiver<UiEvent>, event_type: &str) -> Result<UiEvent> {
        loop {
            let event = next_event(rx).await?;
            if event.event_type() == event_type {
                return Ok(event);
            }
        }
    }

    /// Wait until the listener task has applied a condition
    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..50 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_start_emits_render() -> Result<()> {
        let dashboard = dashboard();
        let mut rx = dashboard.subscribe();

        dashboard.start().await?;

        let event = wait_for(&mut rx, "tree:render").await?;
        let json = event.to_json();
        assert_eq!(json["detail"]["rootCount"], json!(1));
        assert_eq!(json["detail"]["hasMore"], json!(false));
        assert!(json["detail"]["timestamp"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_expand_emits_load_then_state_change() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        let mut rx = dashboard.subscribe();

        dashboard
            .dispatch(UiAction::Toggle(ItemKey::new(NodeType::Project, "p1")))
            .await?;

        let load = wait_for(&mut rx, "tree:node:load").await?;
        let detail = load.to_json()["detail"].clone();
        assert_eq!(detail["nodeId"], json!("p1"));
        assert_eq!(detail["nodeType"], json!("project"));
        assert_eq!(detail["count"], json!(1));
        assert_eq!(detail["fromCache"], json!(false));

        let change = wait_for(&mut rx, "tree:state:change").await?;
        assert!(matches!(
            change.event,
            TreeEvent::StateChange { expanded: true, .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_emits_operation_lifecycle() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        dashboard
            .dispatch(UiAction::Expand(ItemKey::new(NodeType::Project, "p1")))
            .await?;
        let mut rx = dashboard.subscribe();

        let mut values = Map::new();
        values.insert("name".into(), json!("Slipway"));
        dashboard
            .dispatch(UiAction::Add {
                node_type: NodeType::Location,
                fields: vec!["name".into()],
                parent_id: Some("p1".into()),
                values,
            })
            .await?;

        let names = vec![
            next_event(&mut rx).await?.event_type(),
            next_event(&mut rx).await?.event_type(),
            next_event(&mut rx).await?.event_type(),
        ];
        assert_eq!(
            names,
            vec![
                "crud:operation:start",
                "tree:node:add",
                "crud:operation:complete"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_add_detail_carries_placeholder_and_node() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        dashboard
            .dispatch(UiAction::Expand(ItemKey::new(NodeType::Project, "p1")))
            .await?;
        let mut rx = dashboard.subscribe();

        let mut values = Map::new();
        values.insert("name".into(), json!("Slipway"));
        dashboard
            .dispatch(UiAction::Add {
                node_type: NodeType::Location,
                fields: vec!["name".into()],
                parent_id: Some("p1".into()),
                values,
            })
            .await?;

        let add = wait_for(&mut rx, "tree:node:add").await?;
        let detail = add.to_json()["detail"].clone();
        assert_eq!(detail["nodeType"], json!("location"));
        assert_eq!(detail["node"]["name"], json!("Slipway"));
        assert_eq!(detail["node"]["parentId"], json!("p1"));
        assert!(detail["placeholderId"]
            .as_str()
            .is_some_and(|id| id.starts_with("temp-location-")));
        Ok(())
    }

    #[tokio::test]
    async fn test_added_node_reaches_tree_cache() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        dashboard
            .dispatch(UiAction::Expand(ItemKey::new(NodeType::Project, "p1")))
            .await?;

        let mut values = Map::new();
        values.insert("name".into(), json!("Slipway"));
        let created = dashboard
            .dispatch(UiAction::Add {
                node_type: NodeType::Location,
                fields: vec!["name".into()],
                parent_id: Some("p1".into()),
                values,
            })
            .await?;

        let fieldtree_core::ActionOutcome::Created(node) = created else {
            panic!("expected a created node");
        };
        let key = node.key();
        let tree = dashboard.tree().clone();
        assert!(eventually(|| tree.cached(&key).is_some()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_node_added_while_collapsed_shows_on_expand() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        let l1 = ItemKey::new(NodeType::Location, "l1");
        dashboard
            .dispatch(UiAction::Expand(ItemKey::new(NodeType::Project, "p1")))
            .await?;
        dashboard.dispatch(UiAction::Expand(l1.clone())).await?;
        dashboard.dispatch(UiAction::Collapse(l1.clone())).await?;

        let mut values = Map::new();
        values.insert("name".into(), json!("Turbidity"));
        let created = dashboard
            .dispatch(UiAction::Add {
                node_type: NodeType::Measurement,
                fields: vec!["name".into()],
                parent_id: Some("l1".into()),
                values,
            })
            .await?;
        let fieldtree_core::ActionOutcome::Created(node) = created else {
            panic!("expected a created node");
        };
        let key = node.key();
        assert!(!dashboard.view().contains(&key));

        let tree = dashboard.tree().clone();
        assert!(eventually(|| tree.cached(&key).is_some()).await);

        dashboard.dispatch(UiAction::Expand(l1.clone())).await?;
        let children = dashboard.view().child_keys(Some(&l1));
        assert_eq!(
            children,
            vec![ItemKey::new(NodeType::Measurement, "m7"), key]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cleanup_evicts_cached_subtree() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        let l1 = ItemKey::new(NodeType::Location, "l1");
        dashboard
            .dispatch(UiAction::Expand(ItemKey::new(NodeType::Project, "p1")))
            .await?;
        dashboard.dispatch(UiAction::Expand(l1.clone())).await?;
        assert!(dashboard.tree().cached(&l1).is_some());
        let mut rx = dashboard.subscribe();

        dashboard
            .dispatch(UiAction::Delete {
                node_type: NodeType::Location,
                id: "l1".into(),
            })
            .await?;

        let cleanup = wait_for(&mut rx, "tree:node:cleanup").await?;
        assert_eq!(cleanup.to_json()["detail"]["nodeId"], json!("l1"));
        let tree = dashboard.tree().clone();
        assert!(eventually(|| tree.cached(&l1).is_none()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_emits_destroy() -> Result<()> {
        let dashboard = dashboard();
        dashboard.start().await?;
        let mut rx = dashboard.subscribe();

        dashboard.shutdown();

        let event = wait_for(&mut rx, "tree:destroy").await?;
        assert_eq!(event.event, TreeEvent::Destroy);
        assert!(dashboard.view().outline().is_empty());
        Ok(())
    }
}
