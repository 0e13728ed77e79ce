// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `relieve`: turn a discrete flow into a continuous one by combining
//! values that arrive faster than downstream transfers them (spec section
//! 4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Continuous-from-discrete: every value `upstream` produces while a
/// previous one is still pending is folded into it with `rf(pending, new)`.
/// Downstream always transfers the latest reduction.
pub fn relieve<T>(rf: impl Fn(T, T) -> T + Send + 'static, upstream: Flow<T>) -> Flow<T>
where
    T: Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let rf = Arc::new(rf);
        let pending: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle: Arc<Mutex<Option<UpstreamHandle<T>>>> = Arc::new(Mutex::new(None));

        let finish_if_drained = {
            let pending = pending.clone();
            let terminate = terminate.clone();
            move || {
                if pending.lock().is_none() {
                    terminate.fire();
                }
            }
        };

        let pump: Arc<dyn Fn() + Send + Sync> = {
            let rf = rf.clone();
            let pending = pending.clone();
            let failure = failure.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let handle = handle.clone();
            let on_notify = on_notify.clone();
            Arc::new(move || loop {
                if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                    return;
                }
                let next = match handle.lock().as_ref().and_then(|h| h.try_transfer()) {
                    Some(v) => v,
                    None => return,
                };
                match next {
                    Ok(value) => {
                        let mut p = pending.lock();
                        let merged = match p.take() {
                            Some(prev) => (rf)(prev, value),
                            None => value,
                        };
                        *p = Some(merged);
                        drop(p);
                        on_notify();
                    }
                    Err(e) => {
                        stopped.store(true, Ordering::Release);
                        *failure.lock() = Some(e);
                        on_notify();
                        return;
                    }
                }
            })
        };

        let on_upstream_notify = {
            let pump = pump.clone();
            move || pump()
        };
        let on_upstream_terminate = {
            let stopped = stopped.clone();
            let finish_if_drained = finish_if_drained.clone();
            move || {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                finish_if_drained();
            }
        };

        *handle.lock() = Some(UpstreamHandle::new(
            upstream,
            on_upstream_notify,
            on_upstream_terminate,
        ));
        pump();

        let cancel = {
            let cancelled = cancelled.clone();
            let handle = handle.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    if let Some(h) = handle.lock().as_ref() {
                        h.cancel();
                    }
                    terminate.fire();
                }
            })
        };

        let transfer_pending = pending.clone();
        let transfer_failure = failure.clone();
        let transfer_stopped = stopped.clone();
        let transfer_cancelled = cancelled.clone();
        let transfer_terminate = terminate.clone();

        Transfer::new(
            move || {
                if transfer_cancelled.load(Ordering::Acquire) {
                    transfer_terminate.fire();
                    return Err(FluxError::Cancelled);
                }
                let popped = transfer_pending.lock().take();
                if let Some(value) = popped {
                    if transfer_stopped.load(Ordering::Acquire) && transfer_failure.lock().is_none()
                    {
                        transfer_terminate.fire();
                    }
                    return Ok(value);
                }
                if let Some(err) = transfer_failure.lock().take() {
                    transfer_terminate.fire();
                    return Err(err);
                }
                transfer_terminate.fire();
                Err(FluxError::protocol_violation(
                    "relieve: transfer called without a pending notification",
                ))
            },
            cancel,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::enumerate;
    use std::sync::atomic::AtomicUsize;

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
    fn a_consumer_that_keeps_up_sees_every_value_unmerged() {
        let (seen, terminated) = drain(relieve(|a, b| a + b, enumerate(vec![1, 2, 3])));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(terminated, 1);
    }

    #[test]
    fn values_that_outrun_the_consumer_are_folded_into_one_pending_value() {
        // enumerate's own terminate fires synchronously from inside the
        // last transfer, so relieve's pump can drain the whole sequence
        // before the outer consumer gets a chance to transfer anything;
        // whatever lands in `seen` must still sum to the total.
        let (seen, terminated) = drain(relieve(|a, b| a + b, enumerate(vec![1, 2, 3, 4])));
        assert_eq!(seen.iter().sum::<i32>(), 10);
        assert_eq!(terminated, 1);
    }
}
