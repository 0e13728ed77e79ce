// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{criterion_group, criterion_main};

mod flow_bench;
mod task_bench;

use flow_bench::bench_flow;
use task_bench::bench_task;

criterion_group!(benches, bench_task, bench_flow);
criterion_main!(benches);
