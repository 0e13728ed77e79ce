// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Small building blocks shared by the flow sources and transformers in
//! this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{Flow, OnTerminate, Transfer};
use flux_error::FluxError;

/// Wraps a boxed `OnTerminate` so it can be shared across closures and
/// fired exactly once, satisfying invariant #2 (spec section 3) no matter
/// how many code paths race to call it.
#[derive(Clone)]
pub(crate) struct OnceTerminate {
    inner: Arc<Mutex<Option<OnTerminate>>>,
}

impl OnceTerminate {
    pub(crate) fn new(on_terminate: OnTerminate) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(on_terminate))),
        }
    }

    /// Fire the terminator if it has not already fired.
    pub(crate) fn fire(&self) {
        if let Some(f) = self.inner.lock().take() {
            f();
        }
    }
}

/// Wraps a boxed notifier (`Fn() + Send + Sync`) so it can be cloned and
/// shared between the producer side of a combinator and its children.
pub(crate) type SharedNotify = Arc<dyn Fn() + Send + Sync>;

/// Subscribes to an upstream flow and resolves the ordering hazard that
/// comes with `Transfer` being the *return value* of `subscribe`: the
/// upstream's notifier may fire reentrantly, before `subscribe` has handed
/// the `Transfer` back to us. Pending notifications are counted
/// separately and drained via [`try_transfer`](Self::try_transfer) once the
/// handle is fully constructed, so no notification is ever lost and
/// `transfer()` is never called out of turn.
pub(crate) struct UpstreamHandle<T> {
    slot: Arc<Mutex<Option<Transfer<T>>>>,
    pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> UpstreamHandle<T> {
    /// Subscribe to `flow`. `on_notify` is invoked for every upstream
    /// notification, including ones that race ahead of construction; callers
    /// typically respond by calling [`try_transfer`](Self::try_transfer) in a
    /// loop immediately after this returns, to drain anything that arrived
    /// before the slot was ready.
    pub(crate) fn new(
        flow: Flow<T>,
        on_notify: impl Fn() + Send + Sync + 'static,
        on_terminate: impl FnOnce() + Send + 'static,
    ) -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_cb = pending.clone();
        let slot: Arc<Mutex<Option<Transfer<T>>>> = Arc::new(Mutex::new(None));
        let transfer = flow.subscribe(
            move || {
                pending_cb.fetch_add(1, Ordering::SeqCst);
                on_notify();
            },
            on_terminate,
        );
        *slot.lock() = Some(transfer);
        Self { slot, pending }
    }

    /// Consume one pending notification, calling `transfer()` on the
    /// upstream handle. Returns `None` if there is no pending notification,
    /// or if the handle has not finished constructing yet (a reentrant
    /// notifier call arrived before `subscribe` returned).
    pub(crate) fn try_transfer(&self) -> Option<Result<T, FluxError>> {
        let mut guard = self.slot.lock();
        let transfer = guard.as_mut()?;
        let consumed = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok();
        if consumed {
            Some(transfer.transfer())
        } else {
            None
        }
    }

    /// Request cancellation of the upstream subscription.
    pub(crate) fn cancel(&self) {
        if let Some(transfer) = self.slot.lock().as_ref() {
            transfer.cancel();
        }
    }
}
