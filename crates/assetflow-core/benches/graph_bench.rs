//! # Graph Benchmarks
//!
//! Performance benchmarks for assetflow-core construction and evaluation.
//!
//! Run with: `cargo bench -p assetflow-core`

use assetflow_core::{
    AssetGraph, AssetKey, AssetSpec, AssetSubset, AssetsDefinition, Condition, StatusSnapshot,
    TickEvaluator, build_run_requests,
};
use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::hint::black_box;

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().expect("timestamp")
}

/// Definitions of a chain: asset_i depends on asset_{i-1}.
fn linear_definitions(size: usize) -> Vec<AssetsDefinition> {
    (0..size)
        .map(|i| {
            let deps: Vec<String> = if i == 0 {
                Vec::new()
            } else {
                vec![format!("asset_{}", i - 1)]
            };
            let spec = AssetSpec::new(format!("asset_{i}").as_str()).automation(Condition::eager());
            AssetsDefinition::single(spec, deps.iter().map(String::as_str)).expect("definition")
        })
        .collect()
}

/// Definitions of a fan-out: every spoke depends on one hub.
fn star_definitions(size: usize) -> Vec<AssetsDefinition> {
    let mut definitions = vec![
        AssetsDefinition::single(AssetSpec::new("hub"), Vec::<&str>::new()).expect("hub"),
    ];
    for i in 1..size {
        let spec = AssetSpec::new(format!("spoke_{i}").as_str()).automation(Condition::eager());
        definitions.push(AssetsDefinition::single(spec, ["hub"]).expect("spoke"));
    }
    definitions
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");

    for size in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("linear", size), size, |b, &size| {
            b.iter(|| black_box(AssetGraph::from_assets(linear_definitions(size))));
        });
        group.bench_with_input(BenchmarkId::new("star", size), size, |b, &size| {
            b.iter(|| black_box(AssetGraph::from_assets(star_definitions(size))));
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [100, 1000, 5000].iter() {
        let graph = AssetGraph::from_assets(linear_definitions(*size)).expect("graph");
        let middle = AssetKey::from(format!("asset_{}", size / 2).as_str());

        group.bench_with_input(BenchmarkId::from_parameter(size), &middle, |b, key| {
            b.iter(|| black_box(graph.execution_set_asset_keys(key)));
        });
    }

    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    let status = StatusSnapshot::new();

    for size in [100, 500, 1000].iter() {
        let linear = AssetGraph::from_assets(linear_definitions(*size)).expect("graph");
        let star = AssetGraph::from_assets(star_definitions(*size)).expect("graph");

        group.bench_with_input(BenchmarkId::new("linear", size), &linear, |b, graph| {
            b.iter(|| black_box(TickEvaluator::new(graph, &status).evaluate(0, now(), &BTreeMap::new())));
        });
        group.bench_with_input(BenchmarkId::new("star", size), &star, |b, graph| {
            b.iter(|| black_box(TickEvaluator::new(graph, &status).evaluate(0, now(), &BTreeMap::new())));
        });
    }

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    for size in [100, 1000].iter() {
        let graph = AssetGraph::from_assets(linear_definitions(*size)).expect("graph");
        let requested: BTreeMap<AssetKey, AssetSubset> = graph
            .asset_keys()
            .map(|key| (key.clone(), AssetSubset::All))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &requested, |b, requested| {
            b.iter(|| black_box(build_run_requests(&graph, requested, now())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_construction, bench_lookup, bench_tick, bench_planning);

criterion_main!(benches);
