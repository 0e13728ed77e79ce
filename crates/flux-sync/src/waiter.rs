// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Shared building block: a single-fire slot holding a task's continuations.
//!
//! Every coordination primitive in this crate (dataflow variable, mailbox,
//! rendez-vous, semaphore) needs the same shape: a pending "consume" task
//! that is completed exactly once, either by the primitive delivering a
//! value or by the caller cancelling it. `Waiter` factors that out.

use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, OnFailure, OnSuccess};
use flux_error::FluxError;

pub(crate) struct Waiter<T> {
    slot: Arc<Mutex<Option<(OnSuccess<T>, OnFailure)>>>,
}

impl<T: Send + 'static> Waiter<T> {
    pub(crate) fn new(on_success: OnSuccess<T>, on_failure: OnFailure) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some((on_success, on_failure)))),
        }
    }

    /// Complete with a success value. Returns `Err(value)` unchanged if the
    /// waiter already fired (by a prior `complete`, `fail`, or a race with
    /// cancellation), so the caller can hand the value to the next waiter.
    pub(crate) fn complete(&self, value: T) -> Result<(), T> {
        match self.slot.lock().take() {
            Some((on_success, _)) => {
                on_success(value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Complete with a failure. No-op if already fired.
    pub(crate) fn fail(&self, err: FluxError) -> bool {
        if let Some((_, on_failure)) = self.slot.lock().take() {
            on_failure(err);
            true
        } else {
            false
        }
    }

    /// True if this waiter has not yet fired.
    pub(crate) fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// A [`CancelHandle`] that fails this waiter with [`FluxError::Cancelled`]
    /// the first time it is invoked.
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        let slot = self.slot.clone();
        CancelHandle::new(move || {
            if let Some((_, on_failure)) = slot.lock().take() {
                on_failure(FluxError::Cancelled);
            }
        })
    }
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}
