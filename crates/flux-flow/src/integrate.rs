// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `integrate`: a running fold over a discrete flow, re-emitted on every
//! upstream value (spec section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// The result of one reducing step passed to [`integrate`]: either continue
/// folding with the new accumulator, or stop — emitting the final
/// accumulator and then cancelling upstream, mirroring Clojure's `reduced`.
pub enum Step<T> {
    Continue(T),
    Done(T),
}

/// Emits `init` immediately, then `rf(prev, v)` after each upstream value.
/// A `Step::Done` from `rf` emits its value, cancels upstream, and
/// terminates.
pub fn integrate<In, Out>(
    rf: impl FnMut(Out, In) -> Step<Out> + Send + 'static,
    init: Out,
    upstream: Flow<In>,
) -> Flow<Out>
where
    In: Send + 'static,
    Out: Clone + Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let rf = Arc::new(Mutex::new(rf));
        let acc = Arc::new(Mutex::new(init.clone()));
        let buffer: Arc<Mutex<VecDeque<Out>>> = Arc::new(Mutex::new(VecDeque::from([init])));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle: Arc<Mutex<Option<UpstreamHandle<In>>>> = Arc::new(Mutex::new(None));

        let finish_if_drained = {
            let buffer = buffer.clone();
            let terminate = terminate.clone();
            move || {
                if buffer.lock().is_empty() {
                    terminate.fire();
                }
            }
        };

        let pump: Arc<dyn Fn() + Send + Sync> = {
            let rf = rf.clone();
            let acc = acc.clone();
            let buffer = buffer.clone();
            let failure = failure.clone();
            let stopped = stopped.clone();
            let cancelled = cancelled.clone();
            let handle = handle.clone();
            let on_notify = on_notify.clone();
            let finish_if_drained = finish_if_drained.clone();
            Arc::new(move || {
                loop {
                    if cancelled.load(Ordering::Acquire) || stopped.load(Ordering::Acquire) {
                        return;
                    }
                    let next = match handle.lock().as_ref().and_then(|h| h.try_transfer()) {
                        Some(v) => v,
                        None => return,
                    };
                    match next {
                        Ok(value) => {
                            let prev = acc.lock().clone();
                            match (rf.lock())(prev, value) {
                                Step::Continue(new_acc) => {
                                    *acc.lock() = new_acc.clone();
                                    buffer.lock().push_back(new_acc);
                                    on_notify();
                                }
                                Step::Done(new_acc) => {
                                    stopped.store(true, Ordering::Release);
                                    if let Some(h) = handle.lock().as_ref() {
                                        h.cancel();
                                    }
                                    buffer.lock().push_back(new_acc);
                                    on_notify();
                                    finish_if_drained();
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            stopped.store(true, Ordering::Release);
                            *failure.lock() = Some(e);
                            on_notify();
                            return;
                        }
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
        on_notify();
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
                    "integrate: transfer called without a pending notification",
                ))
            },
            cancel,
        )
    })
}
