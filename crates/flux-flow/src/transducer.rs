// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A small transducer library backing [`crate::transform::transform`]:
//! composable `In -> Vec<Out>` steps, independent of any particular flow,
//! that can emit zero, one or many outputs per input and can signal early
//! termination (spec section 4.5, scenario 4).

/// The result of feeding one input value through a transducer step.
pub enum XfResult<Out> {
    /// Zero or more outputs produced; keep feeding inputs.
    Continue(Vec<Out>),
    /// Zero or more outputs produced, followed by a request to stop —
    /// upstream is cancelled and no further inputs are fed.
    Stop(Vec<Out>),
}

/// A stateful transformation from a stream of `In` to a stream of `Out`.
/// Built by composing the constructors below with [`compose2`].
pub struct Xf<In, Out> {
    step: Box<dyn FnMut(In) -> XfResult<Out> + Send>,
    flush: Box<dyn FnMut() -> Vec<Out> + Send>,
}

impl<In: Send + 'static, Out: Send + 'static> Xf<In, Out> {
    /// Build a transducer from its step and flush functions. `flush` is
    /// called once, when upstream terminates, to drain any values held back
    /// by stateful steps (e.g. a partial partition).
    pub fn new(
        step: impl FnMut(In) -> XfResult<Out> + Send + 'static,
        flush: impl FnMut() -> Vec<Out> + Send + 'static,
    ) -> Self {
        Self {
            step: Box::new(step),
            flush: Box::new(flush),
        }
    }

    pub(crate) fn step(&mut self, input: In) -> XfResult<Out> {
        (self.step)(input)
    }

    pub(crate) fn flush(&mut self) -> Vec<Out> {
        (self.flush)()
    }
}

/// A transducer applying a pure function to every element, one in, one out.
pub fn map<In, Out>(f: impl FnMut(In) -> Out + Send + 'static) -> Xf<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let f = std::sync::Arc::new(parking_lot::Mutex::new(f));
    let step_f = f.clone();
    Xf::new(
        move |input| XfResult::Continue(vec![(step_f.lock())(input)]),
        move || Vec::new(),
    )
}

/// A transducer keeping only elements for which `pred` returns `true`.
pub fn filter<T>(mut pred: impl FnMut(&T) -> bool + Send + 'static) -> Xf<T, T>
where
    T: Send + 'static,
{
    Xf::new(
        move |input| {
            if pred(&input) {
                XfResult::Continue(vec![input])
            } else {
                XfResult::Continue(Vec::new())
            }
        },
        move || Vec::new(),
    )
}

/// A transducer expanding each input into zero or more outputs via `f`.
pub fn mapcat<In, Out>(mut f: impl FnMut(In) -> Vec<Out> + Send + 'static) -> Xf<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Xf::new(move |input| XfResult::Continue(f(input)), move || Vec::new())
}

/// A transducer grouping elements into fixed-size chunks, flushing a final
/// short chunk (if any) when upstream terminates.
pub fn partition_all<T>(size: usize) -> Xf<T, Vec<T>>
where
    T: Send + 'static,
{
    assert!(size > 0, "partition_all: size must be positive");
    let buf = std::sync::Arc::new(parking_lot::Mutex::new(Vec::<T>::with_capacity(size)));
    let step_buf = buf.clone();
    Xf::new(
        move |input| {
            let mut guard = step_buf.lock();
            guard.push(input);
            if guard.len() == size {
                XfResult::Continue(vec![std::mem::take(&mut *guard)])
            } else {
                XfResult::Continue(Vec::new())
            }
        },
        move || {
            let mut guard = buf.lock();
            if guard.is_empty() {
                Vec::new()
            } else {
                vec![std::mem::take(&mut *guard)]
            }
        },
    )
}

/// Compose two transducers so that every output of `first` is fed through
/// `second`, in order. A `Stop` from either half propagates as `Stop`,
/// after routing whatever `first` still produced through `second`.
pub fn compose2<A, B, C>(mut first: Xf<A, B>, mut second: Xf<B, C>) -> Xf<A, C>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
{
    Xf::new(
        move |input| {
            let (values, stop) = match first.step(input) {
                XfResult::Continue(values) => (values, false),
                XfResult::Stop(values) => (values, true),
            };
            let mut out = Vec::new();
            let mut second_stop = false;
            for value in values {
                match second.step(value) {
                    XfResult::Continue(mut produced) => out.append(&mut produced),
                    XfResult::Stop(mut produced) => {
                        out.append(&mut produced);
                        second_stop = true;
                        break;
                    }
                }
            }
            if stop || second_stop {
                XfResult::Stop(out)
            } else {
                XfResult::Continue(out)
            }
        },
        move || {
            let mut out = Vec::new();
            for value in first.flush() {
                match second.step(value) {
                    XfResult::Continue(mut produced) | XfResult::Stop(mut produced) => {
                        out.append(&mut produced)
                    }
                }
            }
            out.append(&mut second.flush());
            out
        },
    )
}
