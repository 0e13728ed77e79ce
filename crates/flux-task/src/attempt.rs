// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `attempt`/`absolve`: reify a task's failure into a success value, and
//! back.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{OnFailure, Task};
use flux_error::FluxError;

/// A zero-arg thunk that, when called, either returns a value or raises the
/// error it captured. This is the success value produced by [`attempt`].
pub type Thunk<T> = Box<dyn FnOnce() -> Result<T, FluxError> + Send>;

/// Run `t` and always succeed: the success value is a thunk that, when
/// invoked, returns `t`'s value or raises `t`'s error. Cancelling the
/// returned task propagates to `t` exactly as if `t` had been subscribed to
/// directly — `t`'s own terminal event (including a post-cancel failure)
/// simply becomes the thunk this task succeeds with.
pub fn attempt<T: Send + 'static>(t: Task<T>) -> Task<Thunk<T>> {
    Task::new(move |on_success, _on_failure| {
        t.subscribe(
            move |v| on_success(Box::new(move || Ok(v))),
            move |e| on_success(Box::new(move || Err(e))),
        )
    })
}

/// The inverse of [`attempt`]: run `t`, expecting its success value to be a
/// thunk, and call it. If the thunk returns `Err`, the composite fails.
pub fn absolve<T: Send + 'static>(t: Task<Thunk<T>>) -> Task<T> {
    Task::new(move |on_success, on_failure| {
        let on_failure: Arc<Mutex<Option<OnFailure>>> = Arc::new(Mutex::new(Some(on_failure)));
        let on_failure_for_thunk = on_failure.clone();
        t.subscribe(
            move |thunk| match thunk() {
                Ok(v) => on_success(v),
                Err(e) => {
                    if let Some(on_failure) = on_failure_for_thunk.lock().take() {
                        on_failure(e);
                    }
                }
            },
            move |e| {
                if let Some(on_failure) = on_failure.lock().take() {
                    on_failure(e);
                }
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attempt_reifies_success() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        attempt(Task::succeed(9)).subscribe(
            move |thunk| {
                let _ = tx.send(thunk());
            },
            |_| panic!("attempt always succeeds"),
        );
        assert_eq!(rx.await.unwrap().unwrap(), 9);
    }

    #[tokio::test]
    async fn attempt_reifies_failure() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        attempt(Task::<i32>::fail(FluxError::message("boom"))).subscribe(
            move |thunk| {
                let _ = tx.send(thunk());
            },
            |_| panic!("attempt always succeeds"),
        );
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn absolve_is_left_inverse_of_attempt() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        absolve(attempt(Task::succeed(9))).subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        assert_eq!(rx.await.unwrap(), 9);
    }

    #[tokio::test]
    async fn absolve_propagates_thunk_error() {
        let thunk_task: Task<Thunk<i32>> =
            Task::succeed(Box::new(|| Err(FluxError::message("nope"))));
        let (tx, rx) = tokio::sync::oneshot::channel();
        absolve(thunk_task).subscribe(
            |_| panic!("should not succeed"),
            move |e| {
                let _ = tx.send(e);
            },
        );
        rx.await.unwrap();
    }
}
