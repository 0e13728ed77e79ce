// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `join`: wait for every task to succeed, or fail on the first error.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Task};

struct State<T> {
    results: Vec<Option<T>>,
    remaining: usize,
    terminated: bool,
    handles: Vec<CancelHandle>,
}

/// Subscribe to every task in `tasks`, in order. If all succeed, complete
/// with `combine(values)` in subscription order regardless of completion
/// order. If any fails, cancel the others and fail with that error — the
/// *first* reported error wins, later ones are discarded. `tasks` of length
/// zero completes immediately with `combine(vec![])`.
pub fn join<T: Send + 'static, R: Send + 'static>(
    tasks: Vec<Task<T>>,
    combine: impl FnOnce(Vec<T>) -> R + Send + 'static,
) -> Task<R> {
    let n = tasks.len();
    if n == 0 {
        return Task::succeed(combine(Vec::new()));
    }

    Task::new(move |on_success, on_failure| {
        let state = Arc::new(Mutex::new(State {
            results: (0..n).map(|_| None).collect(),
            remaining: n,
            terminated: false,
            handles: Vec::new(),
        }));
        let on_success = Arc::new(Mutex::new(Some(on_success)));
        let on_failure = Arc::new(Mutex::new(Some(on_failure)));
        let combine = Arc::new(Mutex::new(Some(combine)));

        for (i, task) in tasks.into_iter().enumerate() {
            let success_state = state.clone();
            let success_combine = combine.clone();
            let success_cb = on_success.clone();

            let failure_state = state.clone();
            let failure_cb = on_failure.clone();

            let handle = task.subscribe(
                move |v| {
                    let values = {
                        let mut s = success_state.lock();
                        if s.terminated {
                            return;
                        }
                        s.results[i] = Some(v);
                        s.remaining -= 1;
                        if s.remaining == 0 {
                            s.terminated = true;
                            Some(s.results.iter_mut().map(|o| o.take().unwrap()).collect::<Vec<T>>())
                        } else {
                            None
                        }
                    };
                    if let Some(values) = values {
                        if let Some(combine) = success_combine.lock().take() {
                            if let Some(on_success) = success_cb.lock().take() {
                                on_success(combine(values));
                            }
                        }
                    }
                },
                move |e| {
                    let should_fail = {
                        let mut s = failure_state.lock();
                        if s.terminated {
                            false
                        } else {
                            s.terminated = true;
                            true
                        }
                    };
                    if should_fail {
                        if let Some(on_failure) = failure_cb.lock().take() {
                            on_failure(e);
                        }
                        let handles = failure_state.lock().handles.clone();
                        for h in handles {
                            h.cancel();
                        }
                    }
                },
            );

            let already_terminated = {
                let mut s = state.lock();
                s.handles.push(handle.clone());
                s.terminated
            };
            if already_terminated {
                handle.cancel();
            }
        }

        let state_outer = state.clone();
        CancelHandle::new(move || {
            let handles = state_outer.lock().handles.clone();
            for h in handles {
                h.cancel();
            }
        })
    })
}
