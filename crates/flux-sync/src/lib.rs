// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Coordination primitives for the Flux concurrency runtime.
//!
//! Each primitive here is a stateful object exposing a non-blocking
//! "produce" operation and a [`Task`](flux_core::Task) "consume" operation,
//! per spec section 4.2:
//!
//! - [`DataflowVar`]: single-assignment variable.
//! - [`Mailbox`]: unbounded FIFO queue.
//! - [`Rendezvous`]: synchronous, unbuffered handoff.
//! - [`Semaphore`] and [`holding`]: counted permits with scoped release.
//! - [`sleep`], [`via_call`], [`never`]: timers and executor bridges.

mod dataflow_var;
mod executor;
mod mailbox;
mod rendezvous;
mod semaphore;
mod waiter;

pub use dataflow_var::DataflowVar;
pub use executor::{never, sleep, via_call, Executor};
pub use mailbox::Mailbox;
pub use rendezvous::Rendezvous;
pub use semaphore::{holding, Semaphore};
