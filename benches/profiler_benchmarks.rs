//! Benchmarks for the cost-model profiler's hot path: recording a sample
//! and estimating a cost, both under contention from repeated calls.

use criterion::{criterion_group, criterion_main, Criterion};
use ioc::ir::NodeKindTag;
use ioc::profiler::Profiler;

fn bench_record(c: &mut Criterion) {
    let profiler = Profiler::new();
    c.bench_function("profiler_record", |b| {
        b.iter(|| {
            profiler.record(NodeKindTag::Filter, "naive", 1000, 12.5);
        });
    });
}

fn bench_estimate_exact_bucket(c: &mut Criterion) {
    let profiler = Profiler::new();
    profiler.record(NodeKindTag::Filter, "naive", 1000, 12.5);
    c.bench_function("profiler_estimate_exact_bucket", |b| {
        b.iter(|| profiler.estimate(NodeKindTag::Filter, "naive", 1000));
    });
}

fn bench_estimate_extrapolated(c: &mut Criterion) {
    let profiler = Profiler::new();
    profiler.record(NodeKindTag::Filter, "naive", 1000, 12.5);
    c.bench_function("profiler_estimate_extrapolated", |b| {
        b.iter(|| profiler.estimate(NodeKindTag::Filter, "naive", 2500));
    });
}

criterion_group!(benches, bench_record, bench_estimate_exact_bucket, bench_estimate_extrapolated);
criterion_main!(benches);
