//! Performance benchmarks for fieldtree core operations
//!
//! Run with: `cargo bench -p fieldtree-core`
//!
//! These benchmarks measure critical path performance:
//! - Envelope normalization of large list responses
//! - Cache upserts and child lookups
//! - Cold and cached expansion of a wide project

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fieldtree_core::{
    Dashboard, DashboardConfig, InMemoryDataService, ItemKey, Node, NodeCache, NodeId, NodePage,
    NodeType, NodeTypeRegistry, UiAction,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// `{"results": [...]}` payload with `count` location records
fn location_payload(count: usize) -> Value {
    let records: Vec<Value> = (0..count)
        .map(|i| json!({"id": i, "name": format!("Location {}", i), "depth": i % 40}))
        .collect();
    json!({"results": records, "count": count, "next": null})
}

fn locations(parent: &str, count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| {
            Node::new(
                format!("{}-l{}", parent, i),
                NodeType::Location,
                format!("Location {}", i),
                Some(parent.into()),
            )
        })
        .collect()
}

/// Benchmark envelope normalization
///
/// Measures conversion of a 1000-record response into nodes.
fn bench_envelope_normalization(c: &mut Criterion) {
    let payload = location_payload(1000);
    let parent = NodeId::from("p1");

    c.bench_function("normalize_1000_records", |b| {
        b.iter(|| {
            let page =
                NodePage::from_response(black_box(payload.clone()), NodeType::Location, Some(&parent))
                    .unwrap();
            black_box(page.nodes.len())
        })
    });
}

/// Benchmark cache store and lookup
///
/// Stores 50 parents with 20 children each, then looks every parent up.
fn bench_cache(c: &mut Criterion) {
    let registry = NodeTypeRegistry::default();
    let batches: Vec<(ItemKey, Vec<Node>)> = (0..50)
        .map(|p| {
            let parent = format!("p{}", p);
            (ItemKey::new(NodeType::Project, parent.as_str()), locations(&parent, 20))
        })
        .collect();

    let mut group = c.benchmark_group("node_cache");

    group.bench_function("store_1000_nodes", |b| {
        b.iter(|| {
            let mut cache = NodeCache::new();
            for (parent, nodes) in &batches {
                cache.store(NodeType::Location, Some(parent), nodes.clone());
            }
            black_box(cache.len(NodeType::Location))
        })
    });

    let mut cache = NodeCache::new();
    for (parent, nodes) in &batches {
        cache.store(NodeType::Location, Some(parent), nodes.clone());
    }
    group.bench_function("lookup_50_parents", |b| {
        b.iter(|| {
            for (parent, _) in &batches {
                black_box(cache.get_children(&registry, parent.node_type, &parent.id));
            }
        })
    });

    group.finish();
}

/// Benchmark expansion of a project with 500 locations
///
/// The first toggle fetches and renders; later toggles are served from cache.
fn bench_expansion(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = DashboardConfig {
        animation_ms: 0,
        ..Default::default()
    };

    let mut group = c.benchmark_group("expansion");
    group.sample_size(20);

    group.bench_function("cold_expand_500_children", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let mut total = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let mut nodes = vec![Node::new("p1", NodeType::Project, "Harbour", None)];
                    nodes.extend(locations("p1", 500));
                    let dashboard = Dashboard::new(
                        Arc::new(InMemoryDataService::with_nodes(nodes)),
                        config.clone(),
                    );
                    dashboard.start().await.unwrap();

                    let start = std::time::Instant::now();
                    dashboard
                        .dispatch(UiAction::Toggle(ItemKey::new(NodeType::Project, "p1")))
                        .await
                        .unwrap();
                    total += start.elapsed();
                    dashboard.shutdown();
                }
                total
            })
        });
    });

    group.bench_function("cached_reexpand_500_children", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let mut nodes = vec![Node::new("p1", NodeType::Project, "Harbour", None)];
                nodes.extend(locations("p1", 500));
                let dashboard = Dashboard::new(
                    Arc::new(InMemoryDataService::with_nodes(nodes)),
                    config.clone(),
                );
                dashboard.start().await.unwrap();
                let key = ItemKey::new(NodeType::Project, "p1");
                dashboard.dispatch(UiAction::Toggle(key.clone())).await.unwrap();

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    // collapse, then expand from cache
                    dashboard.dispatch(UiAction::Toggle(key.clone())).await.unwrap();
                    dashboard.dispatch(UiAction::Toggle(key.clone())).await.unwrap();
                }
                let elapsed = start.elapsed();
                dashboard.shutdown();
                elapsed
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_normalization,
    bench_cache,
    bench_expansion
);
criterion_main!(benches);
