//! Development Dashboard Session
//!
//! Standalone binary that wires the fieldtree core to an in-memory data
//! service and replays a scripted session against it, printing the rendered
//! outline after each step and every event page listeners would receive.
//!
//! Architecture:
//!   dev-session → Dashboard → TreeController / CrudController → InMemoryDataService
//!                     ↓
//!                 EventBus → stdout (JSON)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dev-session
//!
//! # With a JSON config document
//! cargo run --bin dev-session -- dashboard.json
//!
//! # More detail from the controllers
//! RUST_LOG=fieldtree_core=debug cargo run --bin dev-session
//! ```
//!
//! # Configuration
//!
//! Without a config file, `FIELDTREE_*` environment variables override the
//! defaults (e.g. `FIELDTREE_PAGE_SIZE=2`). The collapse animation is skipped
//! unless `FIELDTREE_ANIMATION_MS` is set.

use anyhow::Context;
use fieldtree_core::{
    ActionOutcome, Dashboard, DashboardConfig, DataCall, InMemoryDataService, ItemKey, Node,
    NodeType, RemoteError, UiAction,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🔧 Initializing dev-session...");
    let config = load_config()?;
    println!(
        "   Page size: {}, debounce: {}ms, max attempts: {}",
        config.page_size, config.filter_debounce_ms, config.max_attempts
    );

    let data = Arc::new(seed());
    let dashboard = Dashboard::new(data.clone(), config.clone());

    // Print every event as page listeners would see it
    let mut rx = dashboard.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("   📨 {}", event.to_json());
        }
    });

    println!("\n🌳 Rendering projects...");
    let rendered = dashboard.start().await?;
    println!("✅ {} project(s) rendered", rendered);
    print_outline(&dashboard);

    let harbour = ItemKey::new(NodeType::Project, "p1");
    let quay = ItemKey::new(NodeType::Location, "l1");

    step(&dashboard, "Expanding Harbour", UiAction::Toggle(harbour.clone())).await;
    step(&dashboard, "Expanding Quay", UiAction::Toggle(quay.clone())).await;
    step(&dashboard, "Collapsing Harbour", UiAction::Toggle(harbour.clone())).await;
    step(&dashboard, "Re-expanding Harbour (cached)", UiAction::Toggle(harbour)).await;
    println!(
        "   Children fetched {} time(s)",
        data.call_count(DataCall::GetChildren)
    );

    step(&dashboard, "Filtering by 'air'", UiAction::Filter("air".into())).await;
    tokio::time::sleep(config.filter_debounce() + Duration::from_millis(50)).await;
    print_outline(&dashboard);
    step(&dashboard, "Clearing the filter", UiAction::Filter(String::new())).await;
    tokio::time::sleep(config.filter_debounce() + Duration::from_millis(50)).await;
    print_outline(&dashboard);

    step(
        &dashboard,
        "Adding location 'Slipway' to Harbour",
        UiAction::Add {
            node_type: NodeType::Location,
            fields: vec!["name".into(), "address".into()],
            parent_id: Some("p1".into()),
            values: object(json!({"name": "Slipway", "address": "Dock 4"})),
        },
    )
    .await;

    step(
        &dashboard,
        "Renaming measurement 'Depth'",
        UiAction::Update {
            node_type: NodeType::Measurement,
            id: "m1".into(),
            partial: object(json!({"name": "Water depth", "unit": "m"})),
        },
    )
    .await;

    data.fail_next(
        DataCall::Update,
        RemoteError::from_status(422, "name: must not contain '/'"),
    );
    step(
        &dashboard,
        "Renaming 'Salinity' (server rejects)",
        UiAction::Update {
            node_type: NodeType::Measurement,
            id: "m2".into(),
            partial: object(json!({"name": "Salt/Water"})),
        },
    )
    .await;

    data.fail_next(DataCall::Delete, RemoteError::network("connection reset"));
    step(
        &dashboard,
        "Deleting 'Breakwater' (network drops)",
        UiAction::Delete {
            node_type: NodeType::Location,
            id: "l2".into(),
        },
    )
    .await;

    step(
        &dashboard,
        "Deleting 'Breakwater'",
        UiAction::Delete {
            node_type: NodeType::Location,
            id: "l2".into(),
        },
    )
    .await;

    let stats = dashboard.operation_stats();
    println!(
        "\n📊 Operations: {} total, {} succeeded, {} failed, {} pending",
        stats.total, stats.succeeded, stats.failed, stats.pending
    );
    let cache = dashboard.tree().cache_stats();
    println!(
        "   Cache: {} project(s), {} location(s), {} measurement(s)",
        cache.projects, cache.locations, cache.measurements
    );

    if stats.pending > 0 {
        tracing::warn!("{} operation(s) still pending at shutdown", stats.pending);
    }
    dashboard.shutdown();
    // let the printer drain the destroy event
    tokio::time::sleep(Duration::from_millis(20)).await;
    printer.abort();

    println!("\n👋 Session finished");
    Ok(())
}

/// Config from the file named on the command line, or the environment
fn load_config() -> anyhow::Result<DashboardConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            let config = DashboardConfig::from_json(&raw)
                .with_context(|| format!("Invalid config file {}", path))?;
            println!("📄 Loaded config from {}", path);
            Ok(config)
        }
        None => {
            let mut config = DashboardConfig::from_env();
            if std::env::var("FIELDTREE_ANIMATION_MS").is_err() {
                config.animation_ms = 0;
            }
            Ok(config)
        }
    }
}

/// Dispatch one action and report how it went
async fn step(dashboard: &Dashboard, title: &str, action: UiAction) {
    println!("\n▶ {}", title);
    match dashboard.dispatch(action).await {
        Ok(ActionOutcome::Done) => println!("✅ Done"),
        Ok(ActionOutcome::Loaded(count)) => println!("✅ Loaded {} item(s)", count),
        Ok(ActionOutcome::Created(node)) => println!("✅ Created {} {}", node.node_type, node.id),
        Ok(ActionOutcome::Updated(node)) => println!("✅ Updated {} {}", node.node_type, node.id),
        Err(e) => eprintln!("❌ {} (retryable: {})", e, e.is_retryable()),
    }
    print_outline(dashboard);
}

fn print_outline(dashboard: &Dashboard) {
    for line in dashboard.view().outline() {
        println!("   {}", line);
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn seed() -> InMemoryDataService {
    InMemoryDataService::with_nodes(vec![
        Node::new("p1", NodeType::Project, "Harbour", None),
        Node::new("p2", NodeType::Project, "Airport", None),
        Node::new("l1", NodeType::Location, "Quay", Some("p1".into())),
        Node::new("l2", NodeType::Location, "Breakwater", Some("p1".into())),
        Node::new("l3", NodeType::Location, "Runway", Some("p2".into())),
        Node::new("m1", NodeType::Measurement, "Depth", Some("l1".into())),
        Node::new("m2", NodeType::Measurement, "Salinity", Some("l1".into())),
        Node::new("m3", NodeType::Measurement, "Noise", Some("l3".into())),
    ])
}
