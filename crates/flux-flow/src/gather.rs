// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `gather`: merge several discrete flows as their values arrive (spec
//! section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Emits values from any of `flows` as they arrive, interleaved in arrival
/// order; terminates once every upstream has terminated. A failure from
/// any upstream cancels the rest and propagates.
pub fn gather<T: Send + 'static>(flows: Vec<Flow<T>>) -> Flow<T> {
    let n = flows.len();

    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let buffer: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let remaining = Arc::new(AtomicUsize::new(n));
        let handles: Arc<Mutex<Vec<Option<UpstreamHandle<T>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));

        if n == 0 {
            terminate.fire();
            return Transfer::new(
                || Err(FluxError::protocol_violation("gather: transfer on empty composite")),
                CancelHandle::noop(),
            );
        }

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
            let handles = handles.clone();
            let on_notify = on_notify.clone();
            move |e: FluxError| {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                *failure.lock() = Some(e);
                for h in handles.lock().iter().flatten() {
                    h.cancel();
                }
                on_notify();
            }
        };

        let pump: Arc<dyn Fn(usize) + Send + Sync> = {
            let buffer = buffer.clone();
            let handles = handles.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let on_notify = on_notify.clone();
            let fail_all = fail_all.clone();
            Arc::new(move |i: usize| loop {
                if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                    return;
                }
                let result = match handles.lock()[i].as_ref().and_then(|h| h.try_transfer()) {
                    Some(r) => r,
                    None => return,
                };
                match result {
                    Ok(value) => {
                        buffer.lock().push_back(value);
                        on_notify();
                    }
                    Err(e) => {
                        fail_all(e);
                        return;
                    }
                }
            })
        };

        for (i, flow) in flows.into_iter().enumerate() {
            let pump = pump.clone();
            let on_notify_for_upstream = move || pump(i);

            let remaining_for_terminate = remaining.clone();
            let finish_if_drained_for_terminate = finish_if_drained.clone();
            let stopped_for_terminate = stopped.clone();
            let on_terminate_for_upstream = move || {
                if remaining_for_terminate.fetch_sub(1, Ordering::AcqRel) == 1
                    && !stopped_for_terminate.load(Ordering::Acquire)
                {
                    finish_if_drained_for_terminate();
                }
            };

            let handle =
                UpstreamHandle::new(flow, on_notify_for_upstream, on_terminate_for_upstream);
            handles.lock()[i] = Some(handle);
        }
        for i in 0..n {
            pump(i);
        }

        let cancel = {
            let cancelled = cancelled.clone();
            let handles = handles.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    for h in handles.lock().iter().flatten() {
                        h.cancel();
                    }
                    terminate.fire();
                }
            })
        };

        let transfer_buffer = buffer.clone();
        let transfer_failure = failure.clone();
        let transfer_remaining = remaining.clone();
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
                        && transfer_remaining.load(Ordering::Acquire) == 0
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
                    "gather: transfer called without a pending notification",
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
    use std::sync::atomic::AtomicUsize as TestAtomicUsize;

    fn drain<T: Send + 'static>(flow: Flow<T>) -> (Vec<T>, usize) {
        let pending = Arc::new(TestAtomicUsize::new(0));
        let terminated = Arc::new(TestAtomicUsize::new(0));
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
    fn merges_values_from_every_upstream() {
        let (mut seen, terminated) = drain(gather(vec![
            enumerate(vec![1, 2]),
            enumerate(vec![3, 4, 5]),
        ]));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(terminated, 1);
    }
}
