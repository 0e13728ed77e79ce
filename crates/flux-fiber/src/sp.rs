// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `SP`, the sequential-process fiber (spec section 4.6).
//!
//! Rust's `async`/`.await` already *is* the suspendable-block facility
//! spec section 9 asks an implementation to assume: an `async` block is a
//! state machine re-entered by a single-threaded executor at each
//! suspension point, exactly the contract the spec's `unpark(value)` entry
//! point describes. `SP` bodies are therefore plain `async` blocks; `?`
//! (park) is [`Fiber::park`], and `!` (poll cancellation) is
//! [`Fiber::poll_cancelled`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use flux_core::{CancelHandle, CancellationToken, Task};
use flux_error::FluxError;

/// The runtime context threaded through an `SP`/`AP` body: the fiber's own
/// cancellation state. Bodies receive one by value and use it to park on
/// tasks (`?`) and poll for cancellation (`!`).
#[derive(Clone)]
pub struct Fiber {
    cancelled: CancellationToken,
}

impl Fiber {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: CancellationToken::new(),
        }
    }

    pub(crate) fn from_token(cancelled: CancellationToken) -> Self {
        Self { cancelled }
    }

    /// `!`: fail if this fiber has been cancelled, otherwise succeed.
    pub fn poll_cancelled(&self) -> Result<(), FluxError> {
        if self.cancelled.is_cancelled() {
            Err(FluxError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// True if this fiber has been asked to cancel. Advisory — the body is
    /// free to keep running; only [`poll_cancelled`](Self::poll_cancelled)
    /// (`!`) and [`park`](Self::park) (`?`) actually raise.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// `?`: park on `task`. Subscribes immediately; if this fiber is
    /// cancelled (now or while waiting), requests cancellation of `task`
    /// but still awaits its one terminal event per invariant #3 (spec
    /// section 3) before returning.
    pub async fn park<T: Send + 'static>(&self, task: Task<T>) -> Result<T, FluxError> {
        park(&self.cancelled, task).await
    }

    #[must_use]
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        self.cancelled.as_handle()
    }
}

/// Free function version of [`Fiber::park`], usable by `flux-reactor` and
/// the fork combinators that hold a bare [`CancellationToken`] rather than
/// a full `Fiber`.
pub async fn park<T: Send + 'static>(
    token: &CancellationToken,
    task: Task<T>,
) -> Result<T, FluxError> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let tx_err = tx.clone();
    let cancel = task.subscribe(
        move |v| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(Ok(v));
            }
        },
        move |e| {
            if let Some(tx) = tx_err.lock().take() {
                let _ = tx.send(Err(e));
            }
        },
    );

    // Mirror `CancellationToken::wait`'s listen-then-recheck pattern so a
    // cancel racing this call is never missed.
    let listener = token.listen();
    if token.is_cancelled() {
        cancel.cancel();
        return rx.await.unwrap_or(Err(FluxError::Cancelled));
    }

    let mut rx = rx;
    tokio::select! {
        result = &mut rx => return result.unwrap_or(Err(FluxError::Cancelled)),
        _ = listener => {
            cancel.cancel();
        }
    }
    rx.await.unwrap_or(Err(FluxError::Cancelled))
}

/// `SP`: a body is an `async` closure receiving a [`Fiber`] and returning
/// its result; `sp` subscribes it and drives it to completion as a `Task`.
/// Cancelling the returned task's handle marks the fiber cancelled; the
/// body observes this cooperatively at its next `?`/`!` and the task
/// completes only once the body itself returns (it may still succeed,
/// per spec invariant: cancellation is advisory).
pub fn sp<T, F, Fut>(body: F) -> Task<T>
where
    T: Send + 'static,
    Fut: std::future::Future<Output = Result<T, FluxError>> + Send + 'static,
    F: FnOnce(Fiber) -> Fut + Send + 'static,
{
    Task::new(move |on_success, on_failure| {
        let fiber = Fiber::new();
        let cancel_handle = fiber.cancel_handle();
        let future = body(fiber);
        tokio::spawn(async move {
            match future.await {
                Ok(v) => on_success(v),
                Err(e) => on_failure(e),
            }
        });
        cancel_handle
    })
}
