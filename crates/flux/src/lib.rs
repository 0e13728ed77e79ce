// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! # Flux
//!
//! A functional reactive concurrency runtime: one protocol kernel of
//! [`Task`]s and [`Flow`]s, coordination primitives built on top of it,
//! combinators over both, `SP`/`AP` fiber blocks for writing sequential
//! and forking process bodies as plain `async` code, and a cycle-tolerant
//! [`reactor_call`] for wiring those pieces into a dataflow graph.
//!
//! ## Design philosophy
//!
//! Every capability in Flux is a plain value, not a trait object: a
//! `Task` is a boxed one-shot subscribe function, a `Flow` is a boxed
//! backpressured subscribe function, and every combinator — `join`,
//! `race`, `timeout`, `concat`, `switch`, `gather`, the reactor's
//! `stream`/`signal` nodes — builds a new one by composing its children's
//! subscribe functions. Polymorphism comes from composition, not
//! inheritance.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use flux::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let task = join(
//!         vec![Task::succeed(1), Task::succeed(2), Task::succeed(3)],
//!         |results: Vec<i32>| results.into_iter().sum::<i32>(),
//!     );
//!     task.subscribe(
//!         |sum| println!("sum = {sum}"),
//!         |err| eprintln!("failed: {err}"),
//!     );
//! }
//! ```

// Protocol kernel.
pub use flux_core::{
    CancelHandle, CancellationToken, Flow, FluxError, OnFailure, OnNotify, OnSuccess, OnTerminate,
    Result, Task, Transfer,
};

// Coordination primitives.
pub use flux_sync::{holding, never, sleep, via_call, DataflowVar, Executor, Mailbox, Rendezvous, Semaphore};

// Task combinators.
pub use flux_task::{absolve, attempt, compel, join, race, timeout, Thunk};

// Flow sources and transformers.
pub use flux_flow::{
    buffer, compose2, enumerate, filter, gather, integrate, latest, map, mapcat, observe,
    partition_all, publisher, relieve, sample, subscribe, transform, watch, zip, Event, Publisher,
    SharedCell, Step, Subscriber, Subscription, Watchable, Xf, XfResult,
};

// Fiber runtime: SP and AP.
pub use flux_fiber::{concat, gather as ap_gather, park, sp, switch, Fiber, FlowPump, OutputGate};

// The reactor.
pub use flux_reactor::{reactor_call, Node, NodeKind, ReactorCtx};

/// Convenient glob import of the everyday Flux vocabulary.
///
/// Names that collide across modules (`flux_flow::gather` vs.
/// `flux_fiber::gather`) are resolved in favor of the flow combinator here;
/// reach for `flux::ap_gather` or `flux_fiber::gather` directly for the
/// fork discipline.
pub mod prelude {
    pub use crate::{
        attempt, buffer, compel, concat, integrate, join, latest, map, observe, park, race,
        reactor_call, relieve, sample, sp, subscribe, switch, timeout, transform, watch, zip,
        CancelHandle, CancellationToken, Fiber, Flow, FluxError, Node, NodeKind, ReactorCtx,
        Semaphore, Task,
    };
}
