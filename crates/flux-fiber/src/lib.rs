// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::module_name_repetitions)]

//! Fiber runtime for the Flux concurrency runtime (spec section 4.6):
//! `SP`, the sequential-process block, and `AP`, the ambiguous/forking
//! block.
//!
//! Both are expressed on top of Rust's own `async`/`.await`, which already
//! supplies the suspendable-block facility spec section 9 names as an
//! external dependency (see the `sp` module docs and `DESIGN.md`).

pub mod ap;
pub mod pump;
mod sp;

pub use ap::{concat, gather, switch};
pub use pump::{FlowPump, OutputGate, TryRecv};
pub use sp::{park, sp, Fiber};
