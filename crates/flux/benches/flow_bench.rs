// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use flux::{compose2, enumerate, filter, integrate, map, transform, FlowPump, Step};
use std::hint::black_box;
use tokio::runtime::Runtime;

async fn drain<T>(flow: flux::Flow<T>) -> usize
where
    T: Send + 'static,
{
    let mut pump = FlowPump::new(flow);
    let mut count = 0usize;
    while let Some(result) = pump.recv().await {
        black_box(result.expect("benchmarked flows never fail"));
        count += 1;
    }
    count
}

/// Per-value overhead of draining a discrete flow through `integrate` (a
/// running fold) and through `transform` (a `map`/`filter` transducer
/// pipeline), at growing element counts.
pub fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow");

    let sizes = [64usize, 512, 4096];

    for &n in &sizes {
        group.throughput(Throughput::Elements(n as u64));

        let id = BenchmarkId::from_parameter(format!("integrate_sum_{n}"));
        group.bench_with_input(id, &n, |bencher, &n| {
            bencher.iter(|| {
                let rt = Runtime::new().unwrap();
                rt.block_on(async {
                    let values: Vec<u64> = (0..n as u64).collect();
                    let flow = integrate(|acc, v: u64| Step::Continue(acc + v), 0u64, enumerate(values));
                    black_box(drain(flow).await);
                });
            });
        });

        let id = BenchmarkId::from_parameter(format!("transform_map_filter_{n}"));
        group.bench_with_input(id, &n, |bencher, &n| {
            bencher.iter(|| {
                let rt = Runtime::new().unwrap();
                rt.block_on(async {
                    let values: Vec<u64> = (0..n as u64).collect();
                    let xf = compose2(map(|v: u64| v * 2), filter(|v: &u64| v % 3 != 0));
                    let flow = transform(xf, enumerate(values));
                    black_box(drain(flow).await);
                });
            });
        });
    }

    group.finish();
}
