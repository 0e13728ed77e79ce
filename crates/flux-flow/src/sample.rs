// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `sample`: read a continuous flow's current value each time a discrete
//! flow emits (spec section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Waits for `sampled` (continuous) to produce its first value, then emits
/// `f(sampled_current, sampler_value)` once per value `sampler` (discrete)
/// produces. `sampler` terminating ends the composite and cancels
/// `sampled`; a failure on either side, or a `sampler` value arriving
/// before `sampled` has ever emitted, cancels both and propagates.
pub fn sample<S, D, Out>(
    f: impl Fn(S, D) -> Out + Send + 'static,
    sampled: Flow<S>,
    sampler: Flow<D>,
) -> Flow<Out>
where
    S: Clone + Send + 'static,
    D: Send + 'static,
    Out: Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let f = Arc::new(Mutex::new(f));
        let current: Arc<Mutex<Option<S>>> = Arc::new(Mutex::new(None));
        let buffer: Arc<Mutex<VecDeque<Out>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let sampled_handle: Arc<Mutex<Option<UpstreamHandle<S>>>> = Arc::new(Mutex::new(None));
        let sampler_handle: Arc<Mutex<Option<UpstreamHandle<D>>>> = Arc::new(Mutex::new(None));

        let finish_if_drained = {
            let buffer = buffer.clone();
            let terminate = terminate.clone();
            move || {
                if buffer.lock().is_empty() {
                    terminate.fire();
                }
            }
        };

        let fail_all = {
            let stopped = stopped.clone();
            let failure = failure.clone();
            let sampled_handle = sampled_handle.clone();
            let sampler_handle = sampler_handle.clone();
            let on_notify = on_notify.clone();
            move |e: FluxError| {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                *failure.lock() = Some(e);
                if let Some(h) = sampled_handle.lock().as_ref() {
                    h.cancel();
                }
                if let Some(h) = sampler_handle.lock().as_ref() {
                    h.cancel();
                }
                on_notify();
            }
        };

        let pump_sampled: Arc<dyn Fn() + Send + Sync> = {
            let current = current.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let sampled_handle = sampled_handle.clone();
            let fail_all = fail_all.clone();
            Arc::new(move || loop {
                if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                    return;
                }
                let result = match sampled_handle.lock().as_ref().and_then(|h| h.try_transfer()) {
                    Some(r) => r,
                    None => return,
                };
                match result {
                    Ok(value) => *current.lock() = Some(value),
                    Err(e) => {
                        fail_all(e);
                        return;
                    }
                }
            })
        };
        let on_sampled_terminate = || {};

        let pump_sampler: Arc<dyn Fn() + Send + Sync> = {
            let f = f.clone();
            let current = current.clone();
            let buffer = buffer.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let sampler_handle = sampler_handle.clone();
            let on_notify = on_notify.clone();
            let fail_all = fail_all.clone();
            Arc::new(move || loop {
                if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                    return;
                }
                let result = match sampler_handle.lock().as_ref().and_then(|h| h.try_transfer()) {
                    Some(r) => r,
                    None => return,
                };
                match result {
                    Ok(sampler_value) => {
                        let sampled_current = current.lock().clone();
                        match sampled_current {
                            Some(s) => {
                                let out = (f.lock())(s, sampler_value);
                                buffer.lock().push_back(out);
                                on_notify();
                            }
                            None => {
                                crate::logging::warn!(
                                    "sample: sampler emitted before sampled had a value"
                                );
                                fail_all(FluxError::protocol_violation(
                                    "sample: sampler emitted before sampled had a value",
                                ));
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        fail_all(e);
                        return;
                    }
                }
            })
        };
        let on_sampler_terminate = {
            let stopped = stopped.clone();
            let sampled_handle = sampled_handle.clone();
            let finish_if_drained = finish_if_drained.clone();
            move || {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                if let Some(h) = sampled_handle.lock().as_ref() {
                    h.cancel();
                }
                finish_if_drained();
            }
        };

        *sampled_handle.lock() = Some(UpstreamHandle::new(
            sampled,
            {
                let pump_sampled = pump_sampled.clone();
                move || pump_sampled()
            },
            on_sampled_terminate,
        ));
        pump_sampled();
        *sampler_handle.lock() = Some(UpstreamHandle::new(
            sampler,
            {
                let pump_sampler = pump_sampler.clone();
                move || pump_sampler()
            },
            on_sampler_terminate,
        ));
        pump_sampler();

        let cancel = {
            let cancelled = cancelled.clone();
            let sampled_handle = sampled_handle.clone();
            let sampler_handle = sampler_handle.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    if let Some(h) = sampled_handle.lock().as_ref() {
                        h.cancel();
                    }
                    if let Some(h) = sampler_handle.lock().as_ref() {
                        h.cancel();
                    }
                    terminate.fire();
                }
            })
        };

        let transfer_buffer = buffer.clone();
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
                    let mut guard = transfer_buffer.lock();
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
                    "sample: transfer called without a pending notification",
                ))
            },
            cancel,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{watch, SharedCell};
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
    fn emits_the_sampled_current_value_once_per_sampler_tick() {
        let cell = SharedCell::new(100);
        let sampled = watch(cell);
        let sampler = enumerate(vec!['a', 'b', 'c']);
        let (seen, terminated) = drain(sample(
            |s: i32, d: char| format!("{s}{d}"),
            sampled,
            sampler,
        ));
        assert_eq!(seen, vec!["100a", "100b", "100c"]);
        assert_eq!(terminated, 1);
    }
}
