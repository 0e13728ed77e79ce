// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Error and cancellation vocabulary shared by every Flux crate.
//!
//! [`FluxError`] is the single failure channel used by tasks, flows, fibers
//! and the reactor. User computations fail with arbitrary errors (boxed into
//! [`FluxError::Failed`]); the runtime itself only ever raises the remaining
//! variants, each corresponding to one of the error kinds in the protocol
//! (cancellation, timeout, race aggregation, overflow, protocol violation).

use std::fmt;
use std::time::Duration;

/// The failure channel shared by every task and flow in Flux.
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    /// A user computation failed. This is the only variant produced by
    /// leaf computations; everything else is raised by the runtime.
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The operation was cancelled before it could complete.
    ///
    /// Raised for a cancelled pending `deref`/`fetch`/`take`/`give`/`acquire`/
    /// `sleep`, and for `never`.
    #[error("operation cancelled")]
    Cancelled,

    /// [`timeout`](https://docs.rs/flux-task) fired before the wrapped task completed.
    #[error("timed out after {duration:?}")]
    Timeout {
        /// The configured duration that elapsed.
        duration: Duration,
    },

    /// Every candidate of a [`race`](https://docs.rs/flux-task) failed.
    #[error("all {} race candidates failed", .errors.len())]
    RaceFailure {
        /// One error per candidate, in subscription order.
        errors: Vec<FluxError>,
    },

    /// A non-backpressured producer (`observe`) or a bounded `buffer`
    /// received more values than it could hold.
    #[error("overflow: {context}")]
    Overflow {
        /// What overflowed.
        context: String,
    },

    /// A consumer or combinator violated the flow/task protocol: the
    /// one-outstanding rule, using a fork combinator outside an `AP`, or
    /// using `stream!`/`signal!` outside a reactor boot.
    #[error("protocol violation: {context}")]
    ProtocolViolation {
        /// What was violated.
        context: String,
    },
}

impl FluxError {
    /// Wrap an arbitrary user error as a [`FluxError::Failed`].
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(err))
    }

    /// Construct a [`FluxError::Failed`] from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Failed(Box::new(Message(msg.into())))
    }

    /// Construct a [`FluxError::Timeout`].
    #[must_use]
    pub const fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Construct a [`FluxError::RaceFailure`] aggregating `errors`.
    #[must_use]
    pub const fn race_failure(errors: Vec<FluxError>) -> Self {
        Self::RaceFailure { errors }
    }

    /// Construct a [`FluxError::Overflow`].
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow {
            context: context.into(),
        }
    }

    /// Construct a [`FluxError::ProtocolViolation`].
    pub fn protocol_violation(context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            context: context.into(),
        }
    }

    /// True for [`FluxError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for [`FluxError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Specialized `Result` used throughout the Flux runtime.
pub type Result<T> = std::result::Result<T, FluxError>;
