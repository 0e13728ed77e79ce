// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::module_name_repetitions)]

//! Protocol kernel for the Flux functional-reactive concurrency runtime.
//!
//! This crate defines the two abstract capabilities every other Flux crate
//! builds on:
//!
//! - [`Task`]: a one-shot computation completing with exactly one success
//!   or failure.
//! - [`Flow`]: a backpressured, cancellable, potentially-multi-valued
//!   producer driven by the notify/transfer/terminate protocol.
//!
//! Both are plain values (boxed subscribe functions), not trait objects —
//! see the design note in spec section 9: "polymorphism via callbacks, not
//! inheritance". All combinators, coordination primitives, fibers and the
//! reactor are expressed purely in terms of these two contracts.

pub mod cancel;
pub mod flow;
pub mod task;

pub use cancel::{CancelHandle, CancellationToken};
pub use flow::{Flow, OnNotify, OnTerminate, Transfer};
pub use task::{OnFailure, OnSuccess, Task};

pub use flux_error::{FluxError, Result};
