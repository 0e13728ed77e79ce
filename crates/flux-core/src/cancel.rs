// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Cancellation handles and the shared cancellation-token building block.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::{Event, EventListener};

/// The handle returned by [`Task::subscribe`](crate::Task::subscribe) and
/// embedded in every [`Transfer`](crate::Transfer).
///
/// Calling `cancel()` is a polite request for early termination: it never
/// blocks and it is safe to call any number of times, including before the
/// underlying subscription has finished installing itself (invariant #3,
/// spec section 3). Cloning shares the same underlying request.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    /// Wrap a cancellation action. `f` must be idempotent-safe to call
    /// more than once; most callers build `f` on top of [`CancellationToken`].
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// A handle whose `cancel()` does nothing, for producers that ignore
    /// cancellation requests (e.g. [`compel`](https://docs.rs/flux-task)).
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        (self.inner)();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

/// Runtime-agnostic, idempotent cancellation flag with async wait support.
///
/// This is the building block every primitive and combinator in Flux uses
/// to propagate cancellation: a shared flag plus a broadcast wakeup for
/// anyone parked waiting on it. It is deliberately *not* tied to any flow or
/// task shape, so it composes underneath both.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    event: Event,
}

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                event: Event::new(),
            }),
        }
    }

    /// Mark the token cancelled and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.event.notify(usize::MAX);
    }

    /// Non-blocking cancellation check.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Build a [`CancelHandle`] that cancels this token.
    #[must_use]
    pub fn as_handle(&self) -> CancelHandle {
        let token = self.clone();
        CancelHandle::new(move || token.cancel())
    }

    /// Block the current thread until cancelled. Used by primitives whose
    /// "consume" task is driven on a blocking executor thread rather than
    /// woken by a channel (see `flux-sync::sleep`, `via_call`).
    pub fn wait(&self) {
        if self.is_cancelled() {
            return;
        }
        let listener = self.inner.event.listen();
        if self.is_cancelled() {
            return;
        }
        listener.wait();
    }

    /// A listener future/guard usable from async code that already holds an
    /// executor; kept separate from `wait()` so sync and async callers both
    /// have a zero-cost path.
    #[must_use]
    pub fn listen(&self) -> EventListener {
        self.inner.event.listen()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
