//! Trigger pipeline benchmarks
//!
//! - Pure consensus evaluation over growing observation sets
//! - Index assessment (threshold classification only)
//! - A full consensus run through the dispatcher, commit included

use std::sync::Arc;

use canopy_common::{audit::AuditLogger, Readings};
use canopy_gateway::{Dispatcher, Pipeline};
use canopy_index::IndexThresholds;
use canopy_ledger::Ledger;
use canopy_oracle::{evaluate, ConsensusConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

fn readings(n: usize) -> Vec<Readings> {
    (0..n)
        .map(|i| {
            let jitter = (i % 7) as f64 * 0.5;
            Readings::new(50.0 + jitter, 22.0 + jitter / 10.0, 60.0 - jitter, 3.0)
        })
        .collect()
}

fn bench_consensus_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus");
    let config = ConsensusConfig::default();

    for size in [3usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("evaluate", size), &size, |b, &size| {
            let input = readings(size);
            b.iter(|| evaluate(black_box(&input), &config));
        });
    }
    group.finish();
}

fn bench_index_assessment(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    let thresholds = IndexThresholds::default();

    group.bench_function("rainfall", |b| {
        b.iter(|| thresholds.assess_rainfall(black_box(62.0), black_box(100.0)))
    });
    group.bench_function("temperature", |b| {
        b.iter(|| thresholds.assess_temperature(black_box(26.5), black_box(22.0)))
    });
    group.bench_function("drought", |b| {
        b.iter(|| thresholds.assess_drought(black_box(33), black_box(14)))
    });
    group.finish();
}

fn bench_consensus_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.sample_size(50);

    group.bench_function("validate_data_consensus", |b| {
        b.iter_with_setup(
            || {
                let d = Dispatcher::new(
                    Ledger::in_memory(),
                    Pipeline::default(),
                    Arc::new(AuditLogger::empty()),
                );
                let mut ids = Vec::new();
                for i in 0..5 {
                    let oracle = format!("sat-{}", i);
                    let id = format!("OBS-{}", i);
                    let registration = [json!(oracle), json!("Bench"), json!("Satellite")];
                    d.submit("admin", "RegisterOracle", &registration).ok();
                    d.submit(
                        &oracle,
                        "SubmitObservation",
                        &[
                            json!(id),
                            json!(oracle),
                            json!("Nakuru"),
                            json!(0.0),
                            json!(0.0),
                            json!(50.0 + i as f64),
                            json!(22.0),
                            json!(60.0),
                            json!(3.0),
                        ],
                    )
                    .ok();
                    ids.push(id);
                }
                (d, ids)
            },
            |(d, ids)| {
                d.submit(
                    "consensus",
                    "ValidateDataConsensus",
                    &[json!("Nakuru"), json!("2024-03-01T06:00:00Z"), json!(ids)],
                )
            },
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_consensus_evaluation,
    bench_index_assessment,
    bench_consensus_run,
);
criterion_main!(benches);
