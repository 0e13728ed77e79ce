// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `AP`, the ambiguous/forking-process fiber (spec section 4.6).
//!
//! An `AP` body is a *continuation*: a closure receiving one upstream
//! value and a [`Fiber`] and returning a future that produces one
//! downstream value (the code after a `??`/`?!`/`?=` fork point, expressed
//! directly as the closure body rather than through coroutine rewriting —
//! see `sp` module docs and `DESIGN.md` for why `async`/`.await` stands in
//! for the external suspendable-block facility here). [`concat`], [`switch`]
//! and [`gather`] drive that continuation over an upstream flow according
//! to the three fork disciplines and produce the resulting discrete `Flow`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use flux_core::{CancelHandle, CancellationToken, Flow, Transfer};
use flux_error::FluxError;

use crate::pump::{FlowPump, OutputGate};
use crate::sp::Fiber;

type SharedNotify = Arc<dyn Fn() + Send + Sync>;

struct OnceTerminate {
    inner: Arc<parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Clone for OnceTerminate {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl OnceTerminate {
    fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(Some(Box::new(f)))),
        }
    }

    fn fire(&self) {
        if let Some(f) = self.inner.lock().take() {
            f();
        }
    }
}

/// `??`: the concat fork. Iterates `upstream` one value at a time; for
/// each, `continuation` runs to completion and its output is emitted
/// before the next upstream value is requested — backpressured end to
/// end, since the driver only calls back into `upstream` after the
/// previous output has been handed to [`OutputGate::push`], which itself
/// only returns once the slot it filled has been consumed.
pub fn concat<V, T, F, Fut>(upstream: Flow<V>, mut continuation: F) -> Flow<T>
where
    V: Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = Result<T, FluxError>> + Send + 'static,
    F: FnMut(V, Fiber) -> Fut + Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let gate = OutputGate::new();
        let ap_token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut pump = FlowPump::new(upstream);
        let pump_cancel = pump.cancel_handle();

        let driver = {
            let gate = gate.clone();
            let on_notify = on_notify.clone();
            let ap_token = ap_token.clone();
            let finished = finished.clone();
            let terminate = terminate.clone();
            async move {
                loop {
                    if ap_token.is_cancelled() {
                        break;
                    }
                    match pump.recv().await {
                        None => break,
                        Some(Err(e)) => {
                            gate.push(Err(e), &*on_notify).await;
                            break;
                        }
                        Some(Ok(value)) => {
                            let fiber = Fiber::from_token(ap_token.clone());
                            match continuation(value, fiber).await {
                                Ok(out) => gate.push(Ok(out), &*on_notify).await,
                                Err(e) => {
                                    gate.push(Err(e), &*on_notify).await;
                                    break;
                                }
                            }
                        }
                    }
                }
                finished.store(true, Ordering::Release);
                if gate.is_empty() {
                    terminate.fire();
                }
            }
        };
        tokio::spawn(driver);

        let cancel = {
            let cancelled = cancelled.clone();
            let ap_token = ap_token.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    ap_token.cancel();
                    pump_cancel.cancel();
                    terminate.fire();
                }
            })
        };

        Transfer::new(
            move || {
                if cancelled.load(Ordering::Acquire) {
                    return Err(FluxError::Cancelled);
                }
                match gate.take() {
                    Some(result) => {
                        if finished.load(Ordering::Acquire) && gate.is_empty() {
                            terminate.fire();
                        }
                        result
                    }
                    None => {
                        terminate.fire();
                        Err(FluxError::protocol_violation(
                            "concat: transfer called without a pending notification",
                        ))
                    }
                }
            },
            cancel,
        )
    })
}

/// `?!`: the switch fork. Each new upstream value starts a fresh
/// continuation; an older, still-running continuation is not forcibly
/// killed (it shares the fiber's cooperative cancellation model — see
/// `DESIGN.md` for why this spec resolves "the currently-executing
/// continuation is cancelled" as cooperative rather than forced) but its
/// output, if it ever produces one, is discarded once superseded: only the
/// latest generation's result reaches [`OutputGate::push`].
pub fn switch<V, T, F, Fut>(upstream: Flow<V>, mut continuation: F) -> Flow<T>
where
    V: Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = Result<T, FluxError>> + Send + 'static,
    F: FnMut(V, Fiber) -> Fut + Send + 'static,
{
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let gate = OutputGate::new();
        let ap_token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));
        let live = Arc::new(AtomicU64::new(0));

        let mut pump = FlowPump::new(upstream);
        let pump_cancel = pump.cancel_handle();

        let driver = {
            let gate = gate.clone();
            let on_notify = on_notify.clone();
            let ap_token = ap_token.clone();
            let finished = finished.clone();
            let terminate = terminate.clone();
            let generation = generation.clone();
            let live = live.clone();
            async move {
                loop {
                    if ap_token.is_cancelled() {
                        break;
                    }
                    match pump.recv().await {
                        None => break,
                        Some(Err(e)) => {
                            gate.push(Err(e), &*on_notify).await;
                            break;
                        }
                        Some(Ok(value)) => {
                            let my_gen = generation.fetch_add(1, Ordering::AcqRel) + 1;
                            live.store(my_gen, Ordering::Release);
                            let fiber = Fiber::from_token(ap_token.clone());
                            let fut = continuation(value, fiber);
                            let gate = gate.clone();
                            let on_notify = on_notify.clone();
                            let live = live.clone();
                            tokio::spawn(async move {
                                let result = fut.await;
                                if live.load(Ordering::Acquire) == my_gen {
                                    gate.push(result, &*on_notify).await;
                                }
                            });
                        }
                    }
                }
                finished.store(true, Ordering::Release);
                if gate.is_empty() {
                    terminate.fire();
                }
            }
        };
        tokio::spawn(driver);

        let cancel = {
            let cancelled = cancelled.clone();
            let ap_token = ap_token.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    ap_token.cancel();
                    pump_cancel.cancel();
                    terminate.fire();
                }
            })
        };

        Transfer::new(
            move || {
                if cancelled.load(Ordering::Acquire) {
                    return Err(FluxError::Cancelled);
                }
                match gate.take() {
                    Some(result) => {
                        if finished.load(Ordering::Acquire) && gate.is_empty() {
                            terminate.fire();
                        }
                        result
                    }
                    None => {
                        terminate.fire();
                        Err(FluxError::protocol_violation(
                            "switch: transfer called without a pending notification",
                        ))
                    }
                }
            },
            cancel,
        )
    })
}

/// `?=`: the gather fork. Every upstream value starts a concurrent
/// continuation; outputs interleave as they complete. Backpressured: a
/// continuation whose output would land while a previous one is still
/// pending waits, via [`OutputGate::push`].
pub fn gather<V, T, F, Fut>(upstream: Flow<V>, continuation: F) -> Flow<T>
where
    V: Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = Result<T, FluxError>> + Send + 'static,
    F: Fn(V, Fiber) -> Fut + Send + Sync + 'static,
{
    let continuation = Arc::new(continuation);

    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let gate = OutputGate::new();
        let ap_token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut pump = FlowPump::new(upstream);
        let pump_cancel = pump.cancel_handle();

        let driver = {
            let gate = gate.clone();
            let on_notify = on_notify.clone();
            let ap_token = ap_token.clone();
            let finished = finished.clone();
            let terminate = terminate.clone();
            let in_flight = in_flight.clone();
            let continuation = continuation.clone();
            async move {
                loop {
                    if ap_token.is_cancelled() {
                        break;
                    }
                    match pump.recv().await {
                        None => break,
                        Some(Err(e)) => {
                            gate.push(Err(e), &*on_notify).await;
                            break;
                        }
                        Some(Ok(value)) => {
                            in_flight.fetch_add(1, Ordering::AcqRel);
                            let fiber = Fiber::from_token(ap_token.clone());
                            let fut = (continuation)(value, fiber);
                            let gate = gate.clone();
                            let on_notify = on_notify.clone();
                            let in_flight = in_flight.clone();
                            let finished = finished.clone();
                            let terminate = terminate.clone();
                            tokio::spawn(async move {
                                let result = fut.await;
                                let is_err = result.is_err();
                                gate.push(result, &*on_notify).await;
                                in_flight.fetch_sub(1, Ordering::AcqRel);
                                if is_err
                                    || (finished.load(Ordering::Acquire)
                                        && in_flight.load(Ordering::Acquire) == 0
                                        && gate.is_empty())
                                {
                                    terminate.fire();
                                }
                            });
                        }
                    }
                }
                finished.store(true, Ordering::Release);
                if in_flight.load(Ordering::Acquire) == 0 && gate.is_empty() {
                    terminate.fire();
                }
            }
        };
        tokio::spawn(driver);

        let cancel = {
            let cancelled = cancelled.clone();
            let ap_token = ap_token.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    ap_token.cancel();
                    pump_cancel.cancel();
                    terminate.fire();
                }
            })
        };

        Transfer::new(
            move || {
                if cancelled.load(Ordering::Acquire) {
                    return Err(FluxError::Cancelled);
                }
                match gate.take() {
                    Some(result) => result,
                    None => {
                        terminate.fire();
                        Err(FluxError::protocol_violation(
                            "gather: transfer called without a pending notification",
                        ))
                    }
                }
            },
            cancel,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_flow::enumerate;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn drain<T: Send + 'static>(flow: Flow<T>) -> (Vec<Result<T, FluxError>>, usize) {
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
        loop {
            std::thread::yield_now();
            if pending.swap(0, Ordering::SeqCst) > 0 {
                seen.push(transfer.transfer());
            } else if terminated.load(Ordering::SeqCst) > 0 {
                break;
            }
        }
        (seen, terminated.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn concat_runs_each_continuation_to_completion_in_order() {
        let (results, terminated) = tokio::task::spawn_blocking(move || {
            let flow = concat(enumerate(vec![1, 2, 3]), |v, _fiber| async move {
                Ok::<_, FluxError>(v * 10)
            });
            drain(flow)
        })
        .await
        .unwrap();
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(terminated, 1);
    }

    #[tokio::test]
    async fn gather_emits_every_upstream_value() {
        let (results, terminated) = tokio::task::spawn_blocking(move || {
            let flow = gather(enumerate(vec![1, 2, 3, 4]), |v, _fiber| async move {
                Ok::<_, FluxError>(v)
            });
            drain(flow)
        })
        .await
        .unwrap();
        let mut values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(terminated, 1);
    }

    #[tokio::test]
    async fn switch_only_latest_generation_emits() {
        let (results, terminated) = tokio::task::spawn_blocking(move || {
            let flow = switch(enumerate(vec![50u64, 1u64]), |v, fiber| async move {
                fiber
                    .park(flux_sync::sleep(Duration::from_millis(v), v))
                    .await
            });
            drain(flow)
        })
        .await
        .unwrap();
        let values: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![1]);
        assert_eq!(terminated, 1);
    }
}
