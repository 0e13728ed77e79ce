// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Task combinators for the Flux concurrency runtime: [`join`], [`race`],
//! [`attempt`]/[`absolve`], [`timeout`] and [`compel`] — spec section 4.3.

mod attempt;
mod compel;
mod join;
mod race;
mod timeout;

pub use attempt::{absolve, attempt, Thunk};
pub use compel::compel;
pub use join::join;
pub use race::race;
pub use timeout::timeout;
