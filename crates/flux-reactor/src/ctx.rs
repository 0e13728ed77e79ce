// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The reactor's boot-scoped execution context (spec section 4.7):
//! [`reactor_call`] runs a `boot` closure that declares a graph of
//! [`Node`]s, then waits for every node it spawned to terminate, folding
//! the first failure (if any) together with the boot's own result.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use flux_core::{CancelHandle, Flow, Task};
use flux_error::FluxError;

use crate::node::{DynNode, Node, NodeKind, NodeStep};

pub(crate) struct ReactorInner {
    live: AtomicUsize,
    boot_done: AtomicI64,
    failure: Mutex<Option<FluxError>>,
    cancels: Mutex<Vec<CancelHandle>>,
    settled: Notify,
    /// Pinged by any node driver's upstream on notification or
    /// termination; the one handle the round scheduler parks on between
    /// sweeps.
    wake: Arc<Notify>,
    /// Every live node's driver, in registration order. Since a node can
    /// only be built from another node's `flow()` output once that node
    /// already exists, this order is a topological order of the
    /// dependency graph the scheduler sweeps in each round.
    drivers: Mutex<Vec<Box<dyn DynNode>>>,
    /// Monotonic round counter: incremented once per completed sweep.
    round: AtomicU64,
    scheduler_started: AtomicBool,
}

impl ReactorInner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            live: AtomicUsize::new(0),
            boot_done: AtomicI64::new(0),
            failure: Mutex::new(None),
            cancels: Mutex::new(Vec::new()),
            settled: Notify::new(),
            wake: Arc::new(Notify::new()),
            drivers: Mutex::new(Vec::new()),
            round: AtomicU64::new(0),
            scheduler_started: AtomicBool::new(false),
        })
    }

    pub(crate) fn register_node(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn track_cancel(&self, handle: CancelHandle) {
        self.cancels.lock().push(handle);
    }

    pub(crate) fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// How many scheduler sweeps have completed so far. Exposed for
    /// tests asserting that multi-node propagation actually happens
    /// across more than one round rather than all at once.
    #[cfg(test)]
    pub(crate) fn round(&self) -> u64 {
        self.round.load(Ordering::SeqCst)
    }

    /// Register a node's driver with the scheduler, starting the
    /// reactor's sweep loop on the first call. The loop is lazily spawned
    /// (never torn down) like the rest of this crate's ambient executors;
    /// it just parks on `wake` once there is nothing left to step.
    pub(crate) fn register_driver(self: &Arc<Self>, driver: Box<dyn DynNode>) {
        self.drivers.lock().push(driver);
        self.wake.notify_one();
        if !self.scheduler_started.swap(true, Ordering::AcqRel) {
            tokio::spawn(run_scheduler(self.clone()));
        }
    }

    pub(crate) fn node_finished(&self, failure: Option<FluxError>) {
        if let Some(e) = failure {
            self.fail(e);
        }
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.settled.notify_waiters();
        }
    }

    fn fail(&self, e: FluxError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            crate::logging::error!("reactor: node failed, cancelling the rest of the graph: {e}");
            *slot = Some(e);
            drop(slot);
            self.cancel_all();
            self.settled.notify_waiters();
        }
    }

    fn cancel_all(&self) {
        for handle in self.cancels.lock().iter() {
            handle.cancel();
        }
    }

    fn mark_boot_done(&self) {
        self.boot_done.store(1, Ordering::SeqCst);
        self.settled.notify_waiters();
    }

    fn is_settled(&self) -> bool {
        self.boot_done.load(Ordering::SeqCst) == 1
            && (self.live.load(Ordering::SeqCst) == 0 || self.failure.lock().is_some())
    }

    fn take_failure(&self) -> Option<FluxError> {
        self.failure.lock().take()
    }
}

/// The handle a `boot` closure receives: spawns publisher nodes and shares
/// their lifetime with the surrounding [`reactor_call`].
#[derive(Clone)]
pub struct ReactorCtx {
    inner: Arc<ReactorInner>,
}

impl ReactorCtx {
    fn new(inner: Arc<ReactorInner>) -> Self {
        Self { inner }
    }

    /// `stream!`: spawn a discrete publisher node from `upstream`. The
    /// returned [`Node`] can be turned into any number of independent
    /// `Flow` handles via [`Node::flow`].
    pub fn stream<T: Clone + Send + 'static>(&self, upstream: Flow<T>) -> Node<T> {
        Node::spawn(upstream, NodeKind::Stream, self.inner.clone())
    }

    /// `signal!`: spawn a continuous publisher node from `upstream`. Like
    /// [`stream`](Self::stream), but every subscriber is replayed the
    /// current value immediately on subscription.
    pub fn signal<T: Clone + Send + 'static>(&self, upstream: Flow<T>) -> Node<T> {
        Node::spawn(upstream, NodeKind::Signal, self.inner.clone())
    }

    /// Request cancellation of every node spawned so far through this
    /// context, as if one of them had failed. Used by callers that want to
    /// unwind the reactor early from outside a node's own body.
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }
}

/// Run `boot` with a fresh [`ReactorCtx`], then wait until every node it
/// spawned has terminated (or one has failed) before resolving.
///
/// Succeeds with `boot`'s own return value iff every spawned node
/// completes successfully; fails with the first node failure otherwise,
/// cancelling every other live node. Cancelling the returned task cancels
/// `boot`'s future and every node spawned so far.
pub fn reactor_call<R, F, Fut>(boot: F) -> Task<R>
where
    R: Send + 'static,
    Fut: Future<Output = Result<R, FluxError>> + Send + 'static,
    F: FnOnce(ReactorCtx) -> Fut + Send + 'static,
{
    Task::new(move |on_success, on_failure| {
        let inner = ReactorInner::new();
        let ctx = ReactorCtx::new(inner.clone());
        let boot_cancelled = flux_core::CancellationToken::new();

        let inner_for_task = inner.clone();
        let token_for_task = boot_cancelled.clone();
        tokio::spawn(async move {
            // Mirror `CancellationToken::wait`'s listen-then-recheck pattern
            // so a cancel racing the start of `boot` is never missed.
            let listener = token_for_task.listen();
            if token_for_task.is_cancelled() {
                inner_for_task.fail(FluxError::Cancelled);
                inner_for_task.mark_boot_done();
                finish(&inner_for_task, None::<R>, on_success, on_failure);
                return;
            }

            let mut boot_fut = Box::pin(boot(ctx));
            let boot_result = tokio::select! {
                result = &mut boot_fut => result,
                _ = listener => Err(FluxError::Cancelled),
            };
            let boot_value = match boot_result {
                Ok(v) => v,
                Err(e) => {
                    inner_for_task.fail(e);
                    inner_for_task.mark_boot_done();
                    finish(&inner_for_task, None, on_success, on_failure);
                    return;
                }
            };
            inner_for_task.mark_boot_done();

            loop {
                let notified = inner_for_task.settled.notified();
                if inner_for_task.is_settled() {
                    break;
                }
                notified.await;
            }
            finish(&inner_for_task, Some(boot_value), on_success, on_failure);
        });

        let inner_for_cancel = inner.clone();
        CancelHandle::new(move || {
            boot_cancelled.cancel();
            inner_for_cancel.cancel_all();
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_flow::enumerate;
    use std::time::Duration;

    fn failing_flow() -> Flow<i32> {
        Flow::new(|on_notify, on_terminate| {
            on_notify();
            let terminate: Arc<Mutex<Option<flux_core::OnTerminate>>> =
                Arc::new(Mutex::new(Some(on_terminate)));
            flux_core::Transfer::new(
                move || {
                    if let Some(f) = terminate.lock().take() {
                        f();
                    }
                    Err(FluxError::message("node blew up"))
                },
                flux_core::CancelHandle::noop(),
            )
        })
    }

    fn park<T: Send + 'static>(task: Task<T>) -> impl Future<Output = Result<T, FluxError>> {
        async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let tx = Mutex::new(Some(tx));
            task.subscribe(
                move |v| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(v);
                    }
                },
                move |_e| {},
            );
            rx.await.map_err(|_| FluxError::Cancelled)
        }
    }

    #[tokio::test]
    async fn succeeds_once_every_spawned_node_completes() {
        let result = park(reactor_call(|ctx: ReactorCtx| async move {
            let node = ctx.stream(enumerate(vec![1, 2, 3]));
            let _ = node.flow();
            Ok::<_, FluxError>("booted")
        }))
        .await
        .unwrap();
        assert_eq!(result, "booted");
    }

    #[tokio::test]
    async fn fails_when_a_spawned_node_fails() {
        let result = park(reactor_call(|ctx: ReactorCtx| async move {
            let node = ctx.stream(failing_flow());
            let _ = node.flow();
            Ok::<_, FluxError>(())
        }))
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn boot_result_is_independent_of_node_fan_out() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_for_boot = seen.clone();
        let result = park(reactor_call(move |ctx: ReactorCtx| {
            let seen = seen_for_boot.clone();
            async move {
                let node = ctx.signal(enumerate(vec![1, 2, 3]));
                let first = node.flow();
                let second = node.flow();
                drop(first);
                drop(second);
                seen.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, FluxError>(())
            }
        }))
        .await;
        assert!(result.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Arc, ReactorInner};

    /// A standalone [`ReactorInner`] for node-level unit tests that don't
    /// need a full `reactor_call` around them.
    pub(crate) fn fresh_inner() -> Arc<ReactorInner> {
        ReactorInner::new()
    }
}

/// One task per reactor, stepping every registered node driver in
/// registration (topological) order once per sweep. Each full sweep is
/// one round: every driver is stepped at most once, so a node cannot
/// re-propagate within the round it just fired in, which is what bounds
/// a cycle running through shared external state to finite work per
/// round instead of an unbroken cascade. Parks on `wake` between sweeps
/// that made no progress; never explicitly torn down, matching this
/// crate's other lazily-started executors.
async fn run_scheduler(inner: Arc<ReactorInner>) {
    loop {
        let notified = inner.wake.notified();
        let mut fired_any = false;
        {
            let mut drivers = inner.drivers.lock();
            drivers.retain_mut(|driver| match driver.step() {
                NodeStep::Fired => {
                    fired_any = true;
                    true
                }
                NodeStep::Pending => true,
                NodeStep::Terminated => false,
            });
        }
        inner.round.fetch_add(1, Ordering::SeqCst);
        if !fired_any {
            notified.await;
        }
    }
}

fn finish<R>(
    inner: &Arc<ReactorInner>,
    value: Option<R>,
    on_success: impl FnOnce(R),
    on_failure: impl FnOnce(FluxError),
) {
    match inner.take_failure() {
        Some(e) => on_failure(e),
        None => match value {
            Some(v) => on_success(v),
            None => on_failure(FluxError::Cancelled),
        },
    }
}
