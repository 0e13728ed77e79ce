// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::module_name_repetitions)]

//! Cycle-tolerant reactor for the Flux concurrency runtime (spec section
//! 4.7): a boot-scoped graph of publisher nodes built from plain
//! [`flux_core::Flow`]s, composed with [`flux_flow`]'s combinators, and
//! driven to completion as a single [`flux_core::Task`].
//!
//! [`reactor_call`] is the entry point: it hands a [`ReactorCtx`] to a
//! `boot` closure, which declares the node graph via
//! [`ReactorCtx::stream`]/[`ReactorCtx::signal`] and composes the
//! resulting [`Node`]s with ordinary flow combinators. [`reactor_call`]
//! succeeds only once every node it spawned has terminated successfully,
//! and fails with the first node failure otherwise, cancelling the rest.
//!
//! Propagation is round-based (spec section 4.7): every node registers a
//! driver with the reactor instead of pumping itself on its own task, and
//! one background sweep steps every live driver exactly once per round,
//! in the order the nodes were registered. Because a node can only be
//! built from another node's [`Node::flow`] output after that node
//! already exists, registration order is a topological order of the
//! dependency graph, so a sweep never reads a downstream node before the
//! upstream it depends on has already settled for that round. A signal
//! node that accumulates more than one buffered value within a sweep
//! keeps only the last, which is what keeps a node fed by several
//! upstream signals from ever observing a stale sibling mid-round
//! (glitch-free per spec section 4.7's invariant). A cycle closed through
//! shared external state (a node's subscriber mutating the
//! [`flux_flow::SharedCell`] the node itself watches) cannot re-enter the
//! same sweep, since each driver is stepped at most once per round —
//! see `node` module docs and `DESIGN.md` for the cycle-tolerance
//! reasoning and its test coverage.

mod ctx;
mod logging;
mod node;

pub use ctx::{reactor_call, ReactorCtx};
pub use node::{Node, NodeKind};
