// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The task contract: a computation that completes exactly once.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_error::FluxError;

use crate::cancel::CancelHandle;

/// Success continuation installed by [`Task::subscribe`].
pub type OnSuccess<T> = Box<dyn FnOnce(T) + Send + 'static>;
/// Failure continuation installed by [`Task::subscribe`].
pub type OnFailure = Box<dyn FnOnce(FluxError) + Send + 'static>;

/// A one-shot asynchronous computation that completes with exactly one of a
/// success value or a [`FluxError`].
///
/// `Task` is not a trait: per the protocol kernel (spec section 4.1) tasks
/// and flows are plain values tagged by construction, not by a class
/// hierarchy. A `Task<T>` is a boxed subscribe function; every combinator in
/// `flux-task` builds a new one by composing the subscribe functions of its
/// children.
///
/// Subscribing installs both continuations and returns a [`CancelHandle`].
/// Exactly one of `on_success`/`on_failure` is eventually invoked, even if
/// the returned handle is cancelled (cancellation is advisory: a task may
/// still succeed after being asked to cancel).
pub struct Task<T> {
    subscribe: Box<dyn FnOnce(OnSuccess<T>, OnFailure) -> CancelHandle + Send + 'static>,
}

impl<T: Send + 'static> Task<T> {
    /// Build a task from its subscribe function.
    ///
    /// `f` receives the boxed continuations and must guarantee exactly one
    /// of them is called, and must return promptly (real work happens after
    /// `f` returns, driven by whatever triggers the continuations).
    pub fn new(
        f: impl FnOnce(OnSuccess<T>, OnFailure) -> CancelHandle + Send + 'static,
    ) -> Self {
        Self {
            subscribe: Box::new(f),
        }
    }

    /// Install continuations and begin the computation.
    pub fn subscribe(
        self,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(FluxError) + Send + 'static,
    ) -> CancelHandle {
        (self.subscribe)(Box::new(on_success), Box::new(on_failure))
    }

    /// A task that succeeds immediately with `value`.
    #[must_use]
    pub fn succeed(value: T) -> Self {
        Self::new(move |on_success, _on_failure| {
            on_success(value);
            CancelHandle::noop()
        })
    }

    /// A task that fails immediately with `err`.
    #[must_use]
    pub fn fail(err: FluxError) -> Self {
        Self::new(move |_on_success, on_failure| {
            on_failure(err);
            CancelHandle::noop()
        })
    }

    /// Map the success value through `f`, run on whichever thread the
    /// underlying task completes on.
    pub fn map<U: Send + 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Task<U> {
        Task::new(move |on_success, on_failure| {
            self.subscribe(move |v| on_success(f(v)), on_failure)
        })
    }

    /// Map a failure through `f`; success passes through unchanged.
    pub fn map_err(self, f: impl FnOnce(FluxError) -> FluxError + Send + 'static) -> Task<T> {
        Task::new(move |on_success, on_failure| {
            self.subscribe(on_success, move |e| on_failure(f(e)))
        })
    }

    /// Sequence: subscribe to `self`, and on success build and subscribe to
    /// the task produced by `f`. Cancellation before `f` runs cancels
    /// `self`; cancellation after hands off to the child task's handle.
    pub fn and_then<U: Send + 'static>(
        self,
        f: impl FnOnce(T) -> Task<U> + Send + 'static,
    ) -> Task<U> {
        Task::new(move |on_success, on_failure| {
            let on_failure: Arc<Mutex<Option<OnFailure>>> = Arc::new(Mutex::new(Some(on_failure)));
            let slot: Arc<Mutex<CancelHandle>> = Arc::new(Mutex::new(CancelHandle::noop()));
            let slot_outer = slot.clone();

            let outer_failure = on_failure.clone();
            let first_cancel = self.subscribe(
                {
                    let slot = slot.clone();
                    let on_failure = on_failure.clone();
                    move |v| {
                        let child = f(v);
                        let on_failure = on_failure.lock().take().expect(
                            "and_then: failure continuation consumed exactly once per invariant #1",
                        );
                        let handle = child.subscribe(on_success, move |e| on_failure(e));
                        *slot.lock() = handle;
                    }
                },
                move |e| {
                    if let Some(on_failure) = outer_failure.lock().take() {
                        on_failure(e);
                    }
                },
            );
            *slot_outer.lock() = first_cancel;
            CancelHandle::new(move || slot_outer.lock().cancel())
        })
    }

    /// Run `action` exactly once, when `self` reaches its terminal event
    /// (success or failure), before forwarding that event onward. Used to
    /// implement guaranteed-release patterns like [`holding`].
    ///
    /// [`holding`]: https://docs.rs/flux-sync
    pub fn on_terminate(self, action: impl FnOnce() + Send + 'static) -> Task<T> {
        Task::new(move |on_success, on_failure| {
            let action: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> =
                Arc::new(Mutex::new(Some(Box::new(action))));
            let action_success = action.clone();
            self.subscribe(
                move |v| {
                    if let Some(action) = action_success.lock().take() {
                        action();
                    }
                    on_success(v);
                },
                move |e| {
                    if let Some(action) = action.lock().take() {
                        action();
                    }
                    on_failure(e);
                },
            )
        })
    }
}
