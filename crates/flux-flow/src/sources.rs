// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Flow sources: [`enumerate`], [`watch`], [`observe`] (spec section 4.4).
//! The external reactive-streams bridge (`subscribe`/`publisher`) lives in
//! [`crate::external`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify};

/// A discrete flow emitting the elements of `coll` in order, one per
/// transfer. Cancellation mid-stream fails the next (or currently pending)
/// transfer immediately and the flow terminates without emitting the rest.
pub fn enumerate<I>(coll: I) -> Flow<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let iter = Arc::new(Mutex::new(coll.into_iter().peekable()));
        let cancelled = Arc::new(AtomicBool::new(false));

        let cancel = {
            let cancelled = cancelled.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    terminate.fire();
                }
            })
        };

        if !cancelled.load(Ordering::Acquire) && iter.lock().peek().is_some() {
            on_notify();
        } else {
            terminate.fire();
        }

        let transfer_iter = iter.clone();
        let transfer_cancelled = cancelled.clone();
        let transfer_notify = on_notify.clone();
        let transfer_terminate = terminate.clone();

        Transfer::new(
            move || {
                if transfer_cancelled.load(Ordering::Acquire) {
                    transfer_terminate.fire();
                    return Err(FluxError::Cancelled);
                }
                let value = transfer_iter
                    .lock()
                    .next()
                    .expect("transfer called without a pending notification");
                if !transfer_cancelled.load(Ordering::Acquire) && transfer_iter.lock().peek().is_some() {
                    transfer_notify();
                } else {
                    transfer_terminate.fire();
                }
                Ok(value)
            },
            cancel,
        )
    })
}

/// The "watchable reference" external capability (spec section 6):
/// `add-watch(key, fn)` / `remove-watch(key)` / `deref()`, where `fn` is
/// called after each mutation with the new value.
pub trait Watchable<T>: Send + Sync {
    /// The current value.
    fn current(&self) -> T;
    /// Register a watcher, returning a key usable with [`remove_watch`](Self::remove_watch).
    fn add_watch(&self, f: Arc<dyn Fn(T) + Send + Sync>) -> u64;
    /// Deregister a watcher previously installed with `add_watch`.
    fn remove_watch(&self, key: u64);
}

/// A simple in-process implementation of [`Watchable`]: a shared cell with
/// a list of watcher callbacks, invoked synchronously on every [`set`](Self::set).
pub struct SharedCell<T> {
    inner: Mutex<(T, Vec<(u64, Arc<dyn Fn(T) + Send + Sync>)>)>,
    next_key: std::sync::atomic::AtomicU64,
}

impl<T: Clone + Send + 'static> SharedCell<T> {
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new((initial, Vec::new())),
            next_key: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Replace the current value and notify every watcher with the new
    /// value, in registration order.
    pub fn set(&self, value: T) {
        let watchers = {
            let mut guard = self.inner.lock();
            guard.0 = value.clone();
            guard.1.clone()
        };
        for (_, f) in watchers {
            f(value.clone());
        }
    }
}

impl<T: Clone + Send + 'static> Watchable<T> for SharedCell<T> {
    fn current(&self) -> T {
        self.inner.lock().0.clone()
    }

    fn add_watch(&self, f: Arc<dyn Fn(T) + Send + Sync>) -> u64 {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().1.push((key, f));
        key
    }

    fn remove_watch(&self, key: u64) {
        self.inner.lock().1.retain(|(k, _)| *k != key);
    }
}

/// A continuous flow tracking `reference`. The first notification carries
/// the value present at subscription time; every subsequent mutation
/// notifies again. Only the most recent value is retained between
/// notifications — the overflow policy spec section 4.4 and the open
/// question in section 9 both resolve to "latest wins".
pub fn watch<T, W>(reference: Arc<W>) -> Flow<T>
where
    T: Clone + Send + 'static,
    W: Watchable<T> + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let pending: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(Some(reference.current())));
        let cancelled = Arc::new(AtomicBool::new(false));
        let watch_key: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));

        let key = {
            let pending = pending.clone();
            let notify = on_notify.clone();
            let cancelled = cancelled.clone();
            reference.add_watch(Arc::new(move |v: T| {
                if cancelled.load(Ordering::Acquire) {
                    return;
                }
                *pending.lock() = Some(v);
                notify();
            }))
        };
        *watch_key.lock() = Some(key);

        let cancel = {
            let reference = reference.clone();
            let cancelled = cancelled.clone();
            let terminate = terminate.clone();
            let watch_key = watch_key.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    if let Some(key) = watch_key.lock().take() {
                        reference.remove_watch(key);
                    }
                    terminate.fire();
                }
            })
        };

        on_notify();

        let transfer_pending = pending.clone();
        let transfer_cancelled = cancelled.clone();
        let transfer_terminate = terminate.clone();

        Transfer::new(
            move || {
                if transfer_cancelled.load(Ordering::Acquire) {
                    transfer_terminate.fire();
                    return Err(FluxError::Cancelled);
                }
                transfer_pending.lock().take().ok_or_else(|| {
                    FluxError::protocol_violation("watch: transfer without a pending notification")
                })
            },
            cancel,
        )
    })
}

/// The callback handed to `observe`'s `subject`: push a value into the
/// flow. May be called from any thread. Returns
/// [`FluxError::Overflow`] if called again before the previous value has
/// been transferred — non-backpressured subjects must not overflow.
pub type Event<T> = Arc<dyn Fn(T) -> flux_error::Result<()> + Send + Sync>;

/// A discrete flow fed by an external, non-backpressured event source.
/// `subject` is called once at subscription time with an [`Event`]
/// callback and must return a cleanup thunk, invoked on cancellation. A
/// call to `event` after cancellation is a silent no-op (documented
/// resolution of the open question in spec section 9); a call racing with
/// an un-transferred pending value fails with `Overflow`.
pub fn observe<T, S, C>(subject: S) -> Flow<T>
where
    T: Send + 'static,
    C: FnOnce() + Send + 'static,
    S: FnOnce(Event<T>) -> C + Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let pending: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let cancelled = Arc::new(AtomicBool::new(false));

        let event: Event<T> = {
            let pending = pending.clone();
            let notify = on_notify.clone();
            let cancelled = cancelled.clone();
            Arc::new(move |v: T| {
                if cancelled.load(Ordering::Acquire) {
                    return Ok(());
                }
                let mut guard = pending.lock();
                if guard.is_some() {
                    return Err(FluxError::overflow(
                        "observe: previous value not yet transferred",
                    ));
                }
                *guard = Some(v);
                drop(guard);
                notify();
                Ok(())
            })
        };

        let cleanup = subject(event);
        let cleanup: Arc<Mutex<Option<C>>> = Arc::new(Mutex::new(Some(cleanup)));

        let cancel = {
            let cancelled = cancelled.clone();
            let terminate = terminate.clone();
            let cleanup = cleanup.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    if let Some(cleanup) = cleanup.lock().take() {
                        cleanup();
                    }
                    terminate.fire();
                }
            })
        };

        let transfer_pending = pending.clone();
        let transfer_cancelled = cancelled.clone();
        let transfer_terminate = terminate.clone();

        Transfer::new(
            move || {
                if transfer_cancelled.load(Ordering::Acquire) {
                    transfer_terminate.fire();
                    return Err(FluxError::Cancelled);
                }
                transfer_pending.lock().take().ok_or_else(|| {
                    FluxError::protocol_violation("observe: transfer without a pending notification")
                })
            },
            cancel,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Drains a flow by polling a pending-notification counter rather than
    /// calling `transfer()` reentrantly from inside the notifier — the
    /// pattern any real single-threaded consumer (e.g. the reactor) uses,
    /// since the notifier may legitimately fire before `subscribe` returns.
    fn drain<T: Send + 'static>(flow: Flow<T>) -> (Vec<T>, usize) {
        let pending = Arc::new(AtomicUsize::new(0));
        let terminated = Arc::new(AtomicUsize::new(0));
        let pending_notify = pending.clone();
        let terminated_cb = terminated.clone();
        let mut transfer = flow.subscribe(
            move || {
                pending_notify.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                terminated_cb.fetch_add(1, Ordering::SeqCst);
            },
        );
        let mut seen = Vec::new();
        while pending.swap(0, Ordering::SeqCst) > 0 {
            if let Ok(v) = transfer.transfer() {
                seen.push(v);
            }
        }
        (seen, terminated.load(Ordering::SeqCst))
    }

    #[test]
    fn shared_cell_watch_first_notification_is_current_value() {
        let cell = SharedCell::new(10);
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_notify = pending.clone();
        let mut transfer = watch(cell.clone()).subscribe(
            move || {
                pending_notify.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        );
        let mut seen = Vec::new();
        while pending.swap(0, Ordering::SeqCst) > 0 {
            if let Ok(v) = transfer.transfer() {
                seen.push(v);
            }
        }
        assert_eq!(seen, vec![10]);
        cell.set(20);
        while pending.swap(0, Ordering::SeqCst) > 0 {
            if let Ok(v) = transfer.transfer() {
                seen.push(v);
            }
        }
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn enumerate_emits_all_elements_in_order() {
        let (seen, terminated) = drain(enumerate(vec![1, 2, 3]));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(terminated, 1);
    }

    #[test]
    fn enumerate_of_empty_collection_terminates_without_emitting() {
        let (seen, terminated) = drain(enumerate(Vec::<i32>::new()));
        assert!(seen.is_empty());
        assert_eq!(terminated, 1);
    }

    #[test]
    fn observe_delivers_pushed_values_and_runs_cleanup_on_cancel() {
        let cleaned_up = Arc::new(AtomicBool::new(false));
        let cleaned_up_thunk = cleaned_up.clone();
        let pushed: Arc<Mutex<Option<Event<i32>>>> = Arc::new(Mutex::new(None));
        let pushed_setup = pushed.clone();

        let flow = observe(move |event| {
            *pushed_setup.lock() = Some(event);
            move || {
                cleaned_up_thunk.store(true, Ordering::SeqCst);
            }
        });

        let pending = Arc::new(AtomicUsize::new(0));
        let pending_notify = pending.clone();
        let mut transfer = flow.subscribe(
            move || {
                pending_notify.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        );

        let event = pushed.lock().clone().expect("subject ran synchronously");
        event(7).unwrap();
        let mut seen = Vec::new();
        while pending.swap(0, Ordering::SeqCst) > 0 {
            if let Ok(v) = transfer.transfer() {
                seen.push(v);
            }
        }
        assert_eq!(seen, vec![7]);

        event(8).unwrap();
        assert!(event(9).is_err(), "overflow before the value is transferred");

        transfer.cancel();
        assert!(cleaned_up.load(Ordering::SeqCst));
    }
}
