// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `transform`: apply a transducer to a discrete flow (spec section 4.5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::transducer::{Xf, XfResult};
use crate::util::{OnceTerminate, SharedNotify, UpstreamHandle};

/// Drives `upstream` through `xf`, buffering whatever values it produces
/// and emitting them one per downstream transfer. A transducer `Stop`
/// cancels `upstream`; no value `xf` hands back is ever discarded, even
/// the ones produced alongside a `Stop`.
pub fn transform<In, Out>(xf: Xf<In, Out>, upstream: Flow<In>) -> Flow<Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let xf = Arc::new(Mutex::new(xf));
        let buffer: Arc<Mutex<VecDeque<Out>>> = Arc::new(Mutex::new(VecDeque::new()));
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
            let xf = xf.clone();
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
                            let (values, stop) = match xf.lock().step(value) {
                                XfResult::Continue(values) => (values, false),
                                XfResult::Stop(values) => (values, true),
                            };
                            if !values.is_empty() {
                                buffer.lock().extend(values);
                                on_notify();
                            }
                            if stop {
                                stopped.store(true, Ordering::Release);
                                if let Some(h) = handle.lock().as_ref() {
                                    h.cancel();
                                }
                                finish_if_drained();
                                return;
                            }
                        }
                        Err(e) => {
                            stopped.store(true, Ordering::Release);
                            *failure.lock() = Some(e);
                            // One more transfer is owed to deliver the error,
                            // whether or not buffered values precede it.
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
            let xf = xf.clone();
            let buffer = buffer.clone();
            let stopped = stopped.clone();
            let on_notify = on_notify.clone();
            let finish_if_drained = finish_if_drained.clone();
            move || {
                // If we already stopped (transducer `Stop`, or a failing
                // transfer observed by `pump`), upstream's terminal event
                // carries nothing new.
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                let flushed = xf.lock().flush();
                if !flushed.is_empty() {
                    buffer.lock().extend(flushed);
                    on_notify();
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
                    "transform: transfer called without a pending notification",
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
    use crate::transducer::{compose2, filter, mapcat, partition_all};
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
    fn matches_the_documented_filter_mapcat_partition_scenario() {
        let xf = compose2(
            compose2(
                filter(|x: &i32| x % 2 == 1),
                mapcat(|x: i32| (0..x).collect::<Vec<_>>()),
            ),
            partition_all(4),
        );
        let (seen, terminated) = drain(transform(xf, enumerate(0..=9)));
        assert_eq!(
            seen,
            vec![
                vec![0, 0, 1, 2],
                vec![0, 1, 2, 3],
                vec![4, 0, 1, 2],
                vec![3, 4, 5, 6],
                vec![0, 1, 2, 3],
                vec![4, 5, 6, 7],
                vec![8],
            ]
        );
        assert_eq!(terminated, 1);
    }

    #[test]
    fn plain_map_passes_every_element_through() {
        let xf = crate::transducer::map(|x: i32| x * 10);
        let (seen, terminated) = drain(transform(xf, enumerate(vec![1, 2, 3])));
        assert_eq!(seen, vec![10, 20, 30]);
        assert_eq!(terminated, 1);
    }
}
