// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::module_name_repetitions)]

//! Flow sources and transformers for the Flux concurrency runtime (spec
//! sections 4.4 and 4.5).
//!
//! Sources: [`enumerate`], [`watch`], [`observe`], and the external bridge
//! [`subscribe`]/[`publisher`].
//!
//! Transformers: [`transform`] (transducer-driven), [`integrate`],
//! [`relieve`], [`buffer`], [`zip`], [`latest`], [`sample`], [`gather`].

mod buffer;
mod external;
mod gather;
mod integrate;
mod latest;
mod logging;
mod relieve;
mod sample;
mod sources;
mod transducer;
mod transform;
mod util;
mod zip;

pub use buffer::buffer;
pub use external::{publisher, subscribe, Publisher, Subscriber, Subscription};
pub use gather::gather;
pub use integrate::{integrate, Step};
pub use latest::latest;
pub use relieve::relieve;
pub use sample::sample;
pub use sources::{enumerate, observe, watch, Event, SharedCell, Watchable};
pub use transducer::{compose2, filter, map, mapcat, partition_all, Xf, XfResult};
pub use transform::transform;
pub use zip::zip;
