// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `buffer`: accumulate upstream values while downstream lags, failing if a
//! fixed capacity would be exceeded (spec section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Passes `upstream`'s values through unchanged, holding up to `capacity`
/// of them when downstream transfers lag behind. A value arriving once the
/// buffer is already full fails the flow with [`FluxError::Overflow`] and
/// cancels upstream. `capacity` must be positive.
pub fn buffer<T: Send + 'static>(capacity: usize, upstream: Flow<T>) -> Flow<T> {
    assert!(capacity > 0, "buffer: capacity must be positive");

    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let queue: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle: Arc<Mutex<Option<UpstreamHandle<T>>>> = Arc::new(Mutex::new(None));

        let finish_if_drained = {
            let queue = queue.clone();
            let terminate = terminate.clone();
            move || {
                if queue.lock().is_empty() {
                    terminate.fire();
                }
            }
        };

        let pump: Arc<dyn Fn() + Send + Sync> = {
            let queue = queue.clone();
            let failure = failure.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let handle = handle.clone();
            let on_notify = on_notify.clone();
            let finish_if_drained = finish_if_drained.clone();
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
                        let overflowed = {
                            let mut q = queue.lock();
                            if q.len() >= capacity {
                                true
                            } else {
                                q.push_back(value);
                                false
                            }
                        };
                        if overflowed {
                            stopped.store(true, Ordering::Release);
                            *failure.lock() =
                                Some(FluxError::overflow("buffer: capacity exceeded"));
                            if let Some(h) = handle.lock().as_ref() {
                                h.cancel();
                            }
                            on_notify();
                            return;
                        }
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

        let transfer_queue = queue.clone();
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
                let popped = {
                    let mut guard = transfer_queue.lock();
                    guard.pop_front().map(|v| (v, guard.is_empty()))
                };
                if let Some((value, drained)) = popped {
                    if drained
                        && transfer_stopped.load(Ordering::Acquire)
                        && transfer_failure.lock().is_none()
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
                    "buffer: transfer called without a pending notification",
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

    fn drain<T: Send + 'static>(flow: Flow<T>) -> (Vec<T>, Option<FluxError>, usize) {
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
        let mut err = None;
        while pending.swap(0, Ordering::SeqCst) > 0 {
            match transfer.transfer() {
                Ok(v) => seen.push(v),
                Err(e) => err = Some(e),
            }
        }
        (seen, err, terminated.load(Ordering::SeqCst))
    }

    #[test]
    fn passes_values_through_in_order() {
        let (seen, err, terminated) = drain(buffer(4, enumerate(vec![1, 2, 3])));
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(err.is_none());
        assert_eq!(terminated, 1);
    }
}
