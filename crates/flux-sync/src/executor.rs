// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `sleep`, `via_call` and `never`: the remaining coordination primitives,
//! all built directly on top of a process-wide Tokio runtime (the two named
//! executors of spec section 6: a blocking-optimized pool and a
//! CPU-optimized one — both currently backed by Tokio's blocking pool,
//! which sizes and schedules them identically; see `DESIGN.md`).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use flux_core::{CancelHandle, OnFailure, OnSuccess, Task};
use flux_error::FluxError;

/// Which pool a [`via_call`] thunk should run on. Both variants currently
/// share Tokio's blocking thread pool; the distinction is kept so callers
/// can express intent and so a future revision can split them without an
/// API break.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Executor {
    /// For thunks dominated by I/O or otherwise expected to block.
    Blocking,
    /// For thunks dominated by CPU work.
    Cpu,
}

/// A task completing with `value` after `duration` has elapsed, measured
/// from the moment of subscription. Cancellation fails it immediately.
#[must_use]
pub fn sleep<T: Send + 'static>(duration: Duration, value: T) -> Task<T> {
    Task::new(move |on_success, on_failure| {
        let completion: Arc<Mutex<Option<(OnSuccess<T>, OnFailure)>>> =
            Arc::new(Mutex::new(Some((on_success, on_failure))));
        let completion_for_timer = completion.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some((on_success, _)) = completion_for_timer.lock().take() {
                on_success(value);
            }
        });
        CancelHandle::new(move || {
            if let Some((_, on_failure)) = completion.lock().take() {
                handle.abort();
                on_failure(FluxError::Cancelled);
            }
        })
    })
}

/// Schedule `thunk` on `executor`, completing with its return value or
/// failing with its panic payload wrapped as a [`FluxError::Failed`].
/// Cancelling before the thunk has started to run aborts it before it is
/// ever scheduled; cancelling a thunk already running has no effect on it
/// (blocking threads cannot be preempted), so the task may still succeed.
#[must_use]
pub fn via_call<T: Send + 'static>(
    _executor: Executor,
    thunk: impl FnOnce() -> T + Send + 'static,
) -> Task<T> {
    Task::new(move |on_success, on_failure| {
        let join = tokio::task::spawn_blocking(thunk);
        let abort_handle = join.abort_handle();
        tokio::spawn(async move {
            match join.await {
                Ok(value) => on_success(value),
                Err(err) if err.is_cancelled() => on_failure(FluxError::Cancelled),
                Err(err) => on_failure(FluxError::failed(err)),
            }
        });
        CancelHandle::new(move || abort_handle.abort())
    })
}

/// A task that never succeeds on its own; cancelling it fails it with
/// `FluxError::Cancelled`. Useful as the losing half of a `race` used
/// purely for its side effects, or as a placeholder in tests.
#[must_use]
pub fn never<T: Send + 'static>() -> Task<T> {
    Task::new(move |_on_success, on_failure| {
        let holder: Arc<Mutex<Option<OnFailure>>> = Arc::new(Mutex::new(Some(on_failure)));
        CancelHandle::new(move || {
            if let Some(on_failure) = holder.lock().take() {
                on_failure(FluxError::Cancelled);
            }
        })
    })
}
