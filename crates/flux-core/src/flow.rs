// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The flow contract: a backpressured, cancellable, potentially-multi-valued
//! producer.

use std::fmt;

use flux_error::FluxError;

use crate::cancel::CancelHandle;

/// Notifier callback: "a value is ready to be transferred". May be called
/// from any thread, any number of times, but the one-outstanding rule
/// (invariant #1, spec section 3) requires exactly one [`Transfer::transfer`]
/// call between two notifications.
pub type OnNotify = Box<dyn Fn() + Send + Sync + 'static>;
/// Terminator callback: "no more values will come". Called exactly once per
/// subscription, after every notifier it could follow and after any final
/// transfer.
pub type OnTerminate = Box<dyn FnOnce() + Send + 'static>;

/// The handle returned by subscribing to a [`Flow`]: both the cancel
/// operation and the value-producing "transfer" role described in spec
/// section 4.1.
pub struct Transfer<T> {
    transfer: Box<dyn FnMut() -> Result<T, FluxError> + Send + 'static>,
    cancel: CancelHandle,
}

impl<T> Transfer<T> {
    /// Build a transfer handle from its transfer function and cancel handle.
    pub fn new(
        transfer: impl FnMut() -> Result<T, FluxError> + Send + 'static,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            transfer: Box::new(transfer),
            cancel,
        }
    }

    /// Consume the pending value (or error) that the most recent notifier
    /// call announced, and rearm the flow for the next notification.
    /// Calling this without a matching pending notifier is a protocol
    /// violation by the caller (spec invariant #1) and the flow is free to
    /// panic or deadlock in that case, exactly as the upstream source would.
    pub fn transfer(&mut self) -> Result<T, FluxError> {
        (self.transfer)()
    }

    /// Request cancellation. Idempotent; a terminal event (terminator, or a
    /// failing transfer followed by the terminator) is still guaranteed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Borrow the underlying cancel handle, e.g. to store it independently
    /// of the transfer closure's lifetime.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> fmt::Debug for Transfer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer").finish_non_exhaustive()
    }
}

/// A potentially-multi-valued producer: discrete (each notification is a
/// distinct value) or continuous (notifications mean "current value
/// changed"). The distinction is a usage convention documented on each
/// constructor, not a type-level tag (spec section 3: "Flows are
/// classified as...").
///
/// Like [`Task`](crate::Task), `Flow` is a boxed subscribe function rather
/// than a trait object hierarchy.
pub struct Flow<T> {
    subscribe: Box<dyn FnOnce(OnNotify, OnTerminate) -> Transfer<T> + Send + 'static>,
}

impl<T: Send + 'static> Flow<T> {
    /// Build a flow from its subscribe function.
    pub fn new(
        f: impl FnOnce(OnNotify, OnTerminate) -> Transfer<T> + Send + 'static,
    ) -> Self {
        Self {
            subscribe: Box::new(f),
        }
    }

    /// Install the notifier/terminator pair and begin producing.
    pub fn subscribe(
        self,
        on_notify: impl Fn() + Send + Sync + 'static,
        on_terminate: impl FnOnce() + Send + 'static,
    ) -> Transfer<T> {
        (self.subscribe)(Box::new(on_notify), Box::new(on_terminate))
    }

    /// A discrete flow that emits nothing and terminates immediately.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_on_notify, on_terminate| {
            on_terminate();
            Transfer::new(
                || Err(FluxError::protocol_violation("transfer on empty flow")),
                CancelHandle::noop(),
            )
        })
    }
}
