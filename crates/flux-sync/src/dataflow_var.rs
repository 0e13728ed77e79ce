// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Single-assignment dataflow variable.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::Task;

use crate::waiter::Waiter;

enum State<T> {
    Empty(Vec<Waiter<T>>),
    Full(T),
}

/// A single-assignment dataflow variable: the first `assign` wins, later
/// ones are ignored and return the already-bound value. `deref` is a task
/// that completes as soon as a binding exists.
pub struct DataflowVar<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for DataflowVar<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> DataflowVar<T> {
    /// Create an unbound dataflow variable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Empty(Vec::new()))),
        }
    }

    /// Bind the variable to `value`. If already bound, `value` is dropped
    /// and the existing binding is returned. Wakes every pending `deref`.
    pub fn assign(&self, value: T) -> T {
        let waiters = {
            let mut state = self.state.lock();
            match &*state {
                State::Full(existing) => return existing.clone(),
                State::Empty(_) => {
                    let State::Empty(waiters) =
                        std::mem::replace(&mut *state, State::Full(value.clone()))
                    else {
                        unreachable!()
                    };
                    waiters
                }
            }
        };
        for waiter in waiters {
            waiter.complete(value.clone());
        }
        value
    }

    /// A task that completes with the binding as soon as it is present.
    /// Cancelling the pending task fails it with `FluxError::Cancelled`; the
    /// binding itself is unaffected.
    #[must_use]
    pub fn deref(&self) -> Task<T> {
        let state = self.state.clone();
        Task::new(move |on_success, on_failure| {
            let mut guard = state.lock();
            if let State::Full(v) = &*guard {
                let v = v.clone();
                drop(guard);
                on_success(v);
                return flux_core::CancelHandle::noop();
            }
            let waiter = Waiter::new(on_success, on_failure);
            let cancel = waiter.cancel_handle();
            if let State::Empty(waiters) = &mut *guard {
                waiters.push(waiter);
            }
            cancel
        })
    }
}

impl<T: Clone + Send + 'static> Default for DataflowVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_assign_is_ignored() {
        let var: DataflowVar<i32> = DataflowVar::new();
        assert_eq!(var.assign(1), 1);
        assert_eq!(var.assign(2), 1);
    }

    #[tokio::test]
    async fn deref_before_assign_wakes_on_first_write() {
        let var: DataflowVar<i32> = DataflowVar::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        var.deref().subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        var.assign(42);
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn deref_after_assign_completes_immediately() {
        let var: DataflowVar<i32> = DataflowVar::new();
        var.assign(7);
        let (tx, rx) = tokio::sync::oneshot::channel();
        var.deref().subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        assert_eq!(rx.await.unwrap(), 7);
    }
}
