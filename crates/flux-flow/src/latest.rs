// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `latest`: a continuous flow over the current tuple of several other
//! flows (spec section 4.5).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Warms up once every flow in `flows` has emitted at least once, then
/// emits `combine(values)` on the first warm tuple and again on every
/// subsequent change to any one of them. A failure from any upstream
/// cancels the rest and propagates; the composite terminates once every
/// upstream has terminated.
pub fn latest<T, Out>(
    combine: impl Fn(Vec<T>) -> Out + Send + Sync + 'static,
    flows: Vec<Flow<T>>,
) -> Flow<Out>
where
    T: Clone + Send + 'static,
    Out: Send + 'static,
{
    let n = flows.len();

    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let combine = Arc::new(combine);
        let slots: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let pending: Arc<Mutex<Option<Out>>> = Arc::new(Mutex::new(None));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let remaining = Arc::new(AtomicUsize::new(n));
        let handles: Arc<Mutex<Vec<Option<UpstreamHandle<T>>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));

        if n == 0 {
            terminate.fire();
            return Transfer::new(
                || Err(FluxError::protocol_violation("latest: transfer on empty composite")),
                CancelHandle::noop(),
            );
        }

        let finish_if_drained = {
            let pending = pending.clone();
            let terminate = terminate.clone();
            move || {
                if pending.lock().is_none() {
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
            let slots = slots.clone();
            let pending = pending.clone();
            let combine = combine.clone();
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
                        let warm = {
                            let mut s = slots.lock();
                            s[i] = Some(value);
                            s.iter().all(Option::is_some)
                        };
                        if warm {
                            let values = slots
                                .lock()
                                .iter()
                                .map(|s| s.clone().unwrap())
                                .collect::<Vec<T>>();
                            *pending.lock() = Some((combine)(values));
                            on_notify();
                        }
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

        let transfer_pending = pending.clone();
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
                let popped = transfer_pending.lock().take();
                if let Some(value) = popped {
                    if transfer_remaining.load(Ordering::Acquire) == 0
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
                    "latest: transfer called without a pending notification",
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
    fn emits_once_warm_and_again_on_every_change() {
        let a = enumerate(vec![1, 2]);
        let b = enumerate(vec![10]);
        let (seen, terminated) = drain(latest(
            |vals: Vec<i32>| vals.iter().sum::<i32>(),
            vec![a, b],
        ));
        // warms on [1,10] -> 11, then b has nothing left so the only
        // remaining change is a's second value -> [2,10] -> 12.
        assert_eq!(seen, vec![11, 12]);
        assert_eq!(terminated, 1);
    }
}
