// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bridges between the synchronous notify/transfer flow protocol and
//! `async`/`.await` code, for use by the fork combinators in [`crate::ap`]
//! and by `flux-reactor`'s node pump.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

/// Drains an upstream [`Flow`] from async code, one value at a time.
///
/// The flow's notifier may fire any number of times before `subscribe`
/// returns the transfer handle (the same reentrancy hazard `flux-flow`
/// resolves with `UpstreamHandle`); `FlowPump` resolves it the same way,
/// counting pending notifications separately from the transfer slot.
pub struct FlowPump<T> {
    slot: Arc<Mutex<Option<Transfer<T>>>>,
    pending: Arc<AtomicUsize>,
    terminated: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

/// The outcome of a single non-blocking [`FlowPump::try_recv`] poll.
pub enum TryRecv<T> {
    /// A value was ready and has been consumed.
    Ready(Result<T, FluxError>),
    /// The upstream has terminated with nothing left pending.
    Terminated,
    /// Nothing is ready right now; the upstream may still produce more.
    Pending,
}

impl<T: Send + 'static> FlowPump<T> {
    /// Subscribe to `flow` and begin pumping.
    pub fn new(flow: Flow<T>) -> Self {
        Self::new_inner(flow, None)
    }

    /// Subscribe to `flow`, additionally pinging `wake` on every upstream
    /// notification and termination. Used by callers (`flux-reactor`'s
    /// node scheduler) that poll several pumps from one driving loop and
    /// need a single handle to wait on rather than one `Notify` per pump.
    pub fn new_with_wake(flow: Flow<T>, wake: Arc<Notify>) -> Self {
        Self::new_inner(flow, Some(wake))
    }

    fn new_inner(flow: Flow<T>, wake: Option<Arc<Notify>>) -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let terminated = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let slot: Arc<Mutex<Option<Transfer<T>>>> = Arc::new(Mutex::new(None));

        let pending_cb = pending.clone();
        let notify_cb = notify.clone();
        let terminated_cb = terminated.clone();
        let notify_term = notify.clone();
        let wake_notify = wake.clone();
        let wake_term = wake;
        let transfer = flow.subscribe(
            move || {
                pending_cb.fetch_add(1, Ordering::SeqCst);
                notify_cb.notify_one();
                if let Some(w) = &wake_notify {
                    w.notify_one();
                }
            },
            move || {
                terminated_cb.store(true, Ordering::Release);
                notify_term.notify_one();
                if let Some(w) = &wake_term {
                    w.notify_one();
                }
            },
        );
        *slot.lock() = Some(transfer);

        Self {
            slot,
            pending,
            terminated,
            notify,
        }
    }

    /// Consume and return the next value, or `None` once the upstream has
    /// terminated with nothing left pending.
    pub async fn recv(&mut self) -> Option<Result<T, FluxError>> {
        loop {
            let notified = self.notify.notified();
            let consumed = self.pending.fetch_update(
                Ordering::SeqCst,
                Ordering::SeqCst,
                |n| if n > 0 { Some(n - 1) } else { None },
            );
            if consumed.is_ok() {
                let mut guard = self.slot.lock();
                let transfer = guard
                    .as_mut()
                    .expect("FlowPump: transfer slot populated before recv is reachable");
                return Some(transfer.transfer());
            }
            if self.terminated.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Non-blocking poll: consume a pending value if one is ready right
    /// now, without waiting for a future notification.
    pub fn try_recv(&mut self) -> TryRecv<T> {
        let consumed = self.pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > 0 {
                Some(n - 1)
            } else {
                None
            }
        });
        if consumed.is_ok() {
            let mut guard = self.slot.lock();
            let transfer = guard
                .as_mut()
                .expect("FlowPump: transfer slot populated before try_recv is reachable");
            return TryRecv::Ready(transfer.transfer());
        }
        if self.terminated.load(Ordering::Acquire) {
            TryRecv::Terminated
        } else {
            TryRecv::Pending
        }
    }

    /// Request cancellation of the upstream subscription.
    pub fn cancel(&self) {
        if let Some(transfer) = self.slot.lock().as_ref() {
            transfer.cancel();
        }
    }

    /// The upstream's cancel handle, detached from the pump itself.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.slot.lock().as_ref().map(Transfer::cancel_handle)
    }
}

/// A single-slot, backpressured mailbox from producer tasks to a `Flow`'s
/// synchronous `transfer()` side: at most one value is ever pending, and a
/// producer wanting to push a second must wait for the first to be taken.
/// This is the async-side implementation of the "one outstanding" rule for
/// combinators whose production loop lives in a spawned task rather than
/// directly in the `transfer` closure (spec section 4.6: "at most one
/// pending value at a time; forks that want to emit when a value is
/// already pending wait").
pub struct OutputGate<T> {
    pending: Mutex<Option<Result<T, FluxError>>>,
    freed: Notify,
}

impl<T: Send + 'static> OutputGate<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(None),
            freed: Notify::new(),
        })
    }

    /// Wait until the slot is empty, fill it with `value`, and call
    /// `on_notify`. Resolves once the value has been published, not once
    /// it has been consumed.
    pub async fn push(&self, value: Result<T, FluxError>, on_notify: &(dyn Fn() + Send + Sync)) {
        let mut value = Some(value);
        loop {
            let freed = self.freed.notified();
            {
                let mut guard = self.pending.lock();
                if guard.is_none() {
                    *guard = value.take();
                    drop(guard);
                    on_notify();
                    return;
                }
            }
            freed.await;
        }
    }

    /// Take the pending value, if any, waking a producer blocked in
    /// [`push`](Self::push). Called from the synchronous `transfer()` side.
    pub fn take(&self) -> Option<Result<T, FluxError>> {
        let taken = self.pending.lock().take();
        if taken.is_some() {
            self.freed.notify_one();
        }
        taken
    }

    /// Non-consuming peek, used to decide whether a terminator can fire
    /// immediately once the producer side has finished.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_none()
    }
}
