use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vigil_core::TargetDescriptor;

/// Packed targets are decoded once per inbound submission.
fn benchmark_target_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("target_parsing");

    group.bench_function("packed", |b| {
        b.iter(|| TargetDescriptor::parse(black_box("PING%%%203.0.113.17")))
    });

    group.bench_function("plain", |b| {
        b.iter(|| TargetDescriptor::parse(black_box("speed.example.net:8080")))
    });

    group.finish();
}

criterion_group!(benches, benchmark_target_parsing);
criterion_main!(benches);
