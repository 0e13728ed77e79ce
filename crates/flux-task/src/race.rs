// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `race`: the first success wins; failing unanimously aggregates every
//! error.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Task};
use flux_error::FluxError;

struct State {
    errors: Vec<Option<FluxError>>,
    remaining: usize,
    terminated: bool,
    handles: Vec<CancelHandle>,
}

/// Subscribe to every task in `tasks`, in order. The first terminal success
/// (in temporal order, irrespective of subscription order) cancels the
/// others and wins. If every candidate fails, fail with
/// [`FluxError::RaceFailure`] aggregating all child errors in subscription
/// order. `tasks` of length zero fails immediately with an empty aggregate.
pub fn race<T: Send + 'static>(tasks: Vec<Task<T>>) -> Task<T> {
    let n = tasks.len();
    if n == 0 {
        return Task::fail(FluxError::race_failure(Vec::new()));
    }

    Task::new(move |on_success, on_failure| {
        let state = Arc::new(Mutex::new(State {
            errors: (0..n).map(|_| None).collect(),
            remaining: n,
            terminated: false,
            handles: Vec::new(),
        }));
        let on_success = Arc::new(Mutex::new(Some(on_success)));
        let on_failure = Arc::new(Mutex::new(Some(on_failure)));

        for (i, task) in tasks.into_iter().enumerate() {
            let success_state = state.clone();
            let success_cb = on_success.clone();

            let failure_state = state.clone();
            let failure_cb = on_failure.clone();

            let handle = task.subscribe(
                move |v| {
                    let won = {
                        let mut s = success_state.lock();
                        if s.terminated {
                            false
                        } else {
                            s.terminated = true;
                            true
                        }
                    };
                    if won {
                        if let Some(on_success) = success_cb.lock().take() {
                            on_success(v);
                        }
                        let handles = success_state.lock().handles.clone();
                        for h in handles {
                            h.cancel();
                        }
                    }
                },
                move |e| {
                    let errors = {
                        let mut s = failure_state.lock();
                        if s.terminated {
                            return;
                        }
                        s.errors[i] = Some(e);
                        s.remaining -= 1;
                        if s.remaining == 0 {
                            s.terminated = true;
                            Some(
                                s.errors
                                    .iter_mut()
                                    .map(|o| o.take().unwrap())
                                    .collect::<Vec<FluxError>>(),
                            )
                        } else {
                            None
                        }
                    };
                    if let Some(errors) = errors {
                        if let Some(on_failure) = failure_cb.lock().take() {
                            on_failure(FluxError::race_failure(errors));
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_success_wins() {
        let tasks = vec![
            flux_sync::sleep(Duration::from_millis(100), "a"),
            flux_sync::sleep(Duration::from_millis(5), "b"),
        ];
        let (tx, rx) = tokio::sync::oneshot::channel();
        race(tasks).subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        assert_eq!(rx.await.unwrap(), "b");
    }

    #[tokio::test]
    async fn empty_race_fails_with_empty_aggregate() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        race::<i32>(Vec::new()).subscribe(
            |_| panic!("should not succeed"),
            move |e| {
                let _ = tx.send(e);
            },
        );
        match rx.await.unwrap() {
            FluxError::RaceFailure { errors } => assert!(errors.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_failures_aggregate() {
        let tasks: Vec<Task<i32>> = vec![
            Task::fail(FluxError::message("one")),
            Task::fail(FluxError::message("two")),
        ];
        let (tx, rx) = tokio::sync::oneshot::channel();
        race(tasks).subscribe(
            |_| panic!("should not succeed"),
            move |e| {
                let _ = tx.send(e);
            },
        );
        match rx.await.unwrap() {
            FluxError::RaceFailure { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
