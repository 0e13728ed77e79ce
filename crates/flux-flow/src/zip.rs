// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `zip`: lockstep combination of N discrete flows (spec section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Waits until every flow in `flows` has produced a value, emits
/// `combine(values)` in flow order, then requires every flow to produce
/// once more before the next emission. Termination or failure of any
/// upstream terminates the composite and cancels the rest.
pub fn zip<T, Out>(
    combine: impl Fn(Vec<T>) -> Out + Send + Sync + 'static,
    flows: Vec<Flow<T>>,
) -> Flow<Out>
where
    T: Send + 'static,
    Out: Send + 'static,
{
    let n = flows.len();

    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let combine = Arc::new(combine);
        let slots: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let buffer: Arc<Mutex<VecDeque<Out>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handles: Arc<Mutex<Vec<Option<UpstreamHandle<T>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));

        if n == 0 {
            terminate.fire();
            return Transfer::new(
                || Err(FluxError::protocol_violation("zip: transfer on empty composite")),
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
            Arc::new(move |e: FluxError| {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                *failure.lock() = Some(e);
                for h in handles.lock().iter().flatten() {
                    h.cancel();
                }
                on_notify();
            })
        };

        let try_fill_cell: Arc<Mutex<Option<Arc<dyn Fn(usize) + Send + Sync>>>> =
            Arc::new(Mutex::new(None));

        let try_fill: Arc<dyn Fn(usize) + Send + Sync> = {
            let slots = slots.clone();
            let handles = handles.clone();
            let buffer = buffer.clone();
            let combine = combine.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let on_notify = on_notify.clone();
            let fail_all = fail_all.clone();
            let try_fill_cell = try_fill_cell.clone();
            Arc::new(move |i: usize| {
                if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                    return;
                }
                if slots.lock()[i].is_some() {
                    // This round's slot is already full; the value will be
                    // pulled once the round clears.
                    return;
                }
                let result = match handles.lock()[i].as_ref().and_then(|h| h.try_transfer()) {
                    Some(r) => r,
                    None => return,
                };
                match result {
                    Ok(value) => {
                        slots.lock()[i] = Some(value);
                        let ready = slots.lock().iter().all(Option::is_some);
                        if ready {
                            let values = slots
                                .lock()
                                .iter_mut()
                                .map(|s| s.take().unwrap())
                                .collect::<Vec<T>>();
                            let out = (combine)(values);
                            buffer.lock().push_back(out);
                            on_notify();
                            if let Some(f) = try_fill_cell.lock().clone() {
                                for j in 0..n {
                                    f(j);
                                }
                            }
                        }
                    }
                    Err(e) => fail_all(e),
                }
            })
        };
        *try_fill_cell.lock() = Some(try_fill.clone());

        for (i, flow) in flows.into_iter().enumerate() {
            let try_fill = try_fill.clone();
            let on_notify_for_upstream = move || try_fill(i);
            let stopped_for_terminate = stopped.clone();
            let finish_if_drained_for_terminate = finish_if_drained.clone();
            let on_terminate_for_upstream = move || {
                if stopped_for_terminate.swap(true, Ordering::AcqRel) {
                    return;
                }
                finish_if_drained_for_terminate();
            };
            let handle =
                UpstreamHandle::new(flow, on_notify_for_upstream, on_terminate_for_upstream);
            handles.lock()[i] = Some(handle);
        }
        for i in 0..n {
            try_fill(i);
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
                    "zip: transfer called without a pending notification",
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
    fn zips_two_flows_truncating_to_the_shorter() {
        let a = enumerate(vec![1, 2, 3]);
        let b = enumerate(vec![10, 20]);
        let (seen, terminated) = drain(zip(
            |vals: Vec<i32>| vals.iter().sum::<i32>(),
            vec![a, b],
        ));
        assert_eq!(seen, vec![11, 22]);
        assert_eq!(terminated, 1);
    }
}
