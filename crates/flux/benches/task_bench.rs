// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use flux::{join, race, Task};
use std::hint::black_box;
use tokio::runtime::Runtime;

/// Fan-in/fan-out cost of `join` and `race` as the task count grows,
/// mirroring the subscriber-count scaling used to benchmark fan-out from
/// a single broadcast point.
pub fn bench_task(c: &mut Criterion) {
    let mut group = c.benchmark_group("task");

    let task_counts = [1usize, 8, 64, 256];

    for &n in &task_counts {
        group.throughput(Throughput::Elements(n as u64));
        let id = BenchmarkId::from_parameter(format!("join_{n}"));
        group.bench_with_input(id, &n, |bencher, &n| {
            bencher.iter(|| {
                let rt = Runtime::new().unwrap();
                rt.block_on(async {
                    let tasks: Vec<Task<u64>> = (0..n).map(|i| Task::succeed(i as u64)).collect();
                    let (tx, rx) = tokio::sync::oneshot::channel();
                    join(tasks, |values| values).subscribe(
                        move |values| {
                            let _ = tx.send(values);
                        },
                        |_| unreachable!("join of succeeding tasks cannot fail"),
                    );
                    black_box(rx.await.unwrap());
                });
            });
        });

        let id = BenchmarkId::from_parameter(format!("race_{n}"));
        group.bench_with_input(id, &n, |bencher, &n| {
            bencher.iter(|| {
                let rt = Runtime::new().unwrap();
                rt.block_on(async {
                    let tasks: Vec<Task<u64>> = (0..n).map(|i| Task::succeed(i as u64)).collect();
                    let (tx, rx) = tokio::sync::oneshot::channel();
                    race(tasks).subscribe(
                        move |v| {
                            let _ = tx.send(v);
                        },
                        |_| unreachable!("race among succeeding tasks cannot fail"),
                    );
                    black_box(rx.await.unwrap());
                });
            });
        });
    }

    group.finish();
}
