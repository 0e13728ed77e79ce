// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The external reactive-streams bridge: `subscribe(publisher)` turns a
//! foreign, request-n-backpressured publisher into a [`Flow`]; `publisher`
//! does the reverse, exposing a flow to foreign subscribers (spec sections
//! 4.4 and 6).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;

use crate::util::{OnceTerminate, SharedNotify};

/// A foreign subscription: request more items, or cancel outright. May be
/// called from any thread.
pub trait Subscription: Send + Sync {
    fn request(&self, n: u64);
    fn cancel(&self);
}

/// A foreign subscriber, as handed to [`Publisher::subscribe`].
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);
    fn on_next(&mut self, value: T);
    fn on_error(&mut self, error: FluxError);
    fn on_complete(&mut self);
}

/// A foreign publisher, as consumed by [`subscribe`].
pub trait Publisher<T>: Send {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T> + Send>);
}

/// Adapts a foreign [`Publisher`] into a discrete [`Flow`]. Each downstream
/// notification requests exactly one more item upstream, preserving the
/// one-outstanding rule across the bridge; a foreign `on_error` fails the
/// flow, `on_complete` terminates it cleanly.
pub fn subscribe<T: Send + 'static>(publisher: Box<dyn Publisher<T>>) -> Flow<T> {
    Flow::new(move |on_notify, on_terminate| {
        let on_notify: SharedNotify = Arc::from(on_notify);
        let terminate = OnceTerminate::new(on_terminate);
        let buffer: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failure: Arc<Mutex<Option<FluxError>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let subscription: Arc<Mutex<Option<Arc<dyn Subscription>>>> = Arc::new(Mutex::new(None));

        struct Bridge<T> {
            buffer: Arc<Mutex<VecDeque<T>>>,
            failure: Arc<Mutex<Option<FluxError>>>,
            stopped: Arc<AtomicBool>,
            on_notify: SharedNotify,
            subscription: Arc<Mutex<Option<Arc<dyn Subscription>>>>,
        }

        impl<T: Send + 'static> Subscriber<T> for Bridge<T> {
            fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
                subscription.request(1);
                *self.subscription.lock() = Some(subscription);
            }
            fn on_next(&mut self, value: T) {
                self.buffer.lock().push_back(value);
                (self.on_notify)();
            }
            fn on_error(&mut self, error: FluxError) {
                self.stopped.store(true, Ordering::Release);
                *self.failure.lock() = Some(error);
                (self.on_notify)();
            }
            fn on_complete(&mut self) {
                self.stopped.store(true, Ordering::Release);
                (self.on_notify)();
            }
        }

        publisher.subscribe(Box::new(Bridge {
            buffer: buffer.clone(),
            failure: failure.clone(),
            stopped: stopped.clone(),
            on_notify: on_notify.clone(),
            subscription: subscription.clone(),
        }));

        let cancel = {
            let cancelled = cancelled.clone();
            let subscription = subscription.clone();
            let terminate = terminate.clone();
            CancelHandle::new(move || {
                if !cancelled.swap(true, Ordering::AcqRel) {
                    if let Some(s) = subscription.lock().as_ref() {
                        s.cancel();
                    }
                    terminate.fire();
                }
            })
        };

        let transfer_buffer = buffer.clone();
        let transfer_failure = failure.clone();
        let transfer_stopped = stopped.clone();
        let transfer_cancelled = cancelled.clone();
        let transfer_terminate = terminate.clone();
        let transfer_subscription = subscription.clone();

        Transfer::new(
            move || {
                if transfer_cancelled.load(Ordering::Acquire) {
                    transfer_terminate.fire();
                    return Err(FluxError::Cancelled);
                }
                let popped = {
                    let mut guard = transfer_buffer.lock();
                    guard.pop_front().map(|v| (v, guard.is_empty()))
                };
                if let Some((value, drained)) = popped {
                    if drained
                        && transfer_stopped.load(Ordering::Acquire)
                        && transfer_failure.lock().is_none()
                    {
                        transfer_terminate.fire();
                    } else if !transfer_stopped.load(Ordering::Acquire) {
                        if let Some(s) = transfer_subscription.lock().as_ref() {
                            s.request(1);
                        }
                    }
                    return Ok(value);
                }
                if let Some(err) = transfer_failure.lock().take() {
                    transfer_terminate.fire();
                    return Err(err);
                }
                transfer_terminate.fire();
                Err(FluxError::protocol_violation(
                    "subscribe: transfer called without a pending notification",
                ))
            },
            cancel,
        )
    })
}

struct FlowSubscription<T> {
    // Bookkeeping is split from `transfer` so that a reentrant notify
    // firing synchronously from inside `transfer.transfer()` (the same
    // hazard `UpstreamHandle` guards against) never tries to reacquire a
    // lock already held on this thread's stack: it only ever touches
    // `bookkeeping`, never `transfer`.
    bookkeeping: Mutex<Bookkeeping>,
    transfer: Mutex<Option<Transfer<T>>>,
    subscriber: Mutex<Option<Box<dyn Subscriber<T> + Send>>>,
}

struct Bookkeeping {
    requested: u64,
    pending: usize,
    draining: bool,
    done: bool,
    // True for the duration of `Publisher::subscribe`'s own setup, so a
    // `request` call made synchronously from inside the subscriber's
    // `on_subscribe` doesn't try to drain before `transfer`/`subscriber`
    // are actually in place. The caller performs one explicit catch-up
    // `drain` once setup finishes, same as `UpstreamHandle`'s consumers
    // do after storing their handle.
    setting_up: bool,
}

impl<T: Send + 'static> FlowSubscription<T> {
    fn drain(&self) {
        loop {
            let should_pull = {
                let mut bk = self.bookkeeping.lock();
                if bk.done || bk.draining || bk.setting_up || bk.requested == 0 || bk.pending == 0
                {
                    return;
                }
                bk.draining = true;
                bk.requested -= 1;
                bk.pending -= 1;
                true
            };
            if !should_pull {
                return;
            }
            let result = {
                let mut transfer = self.transfer.lock();
                transfer.as_mut().map(|t| t.transfer())
            };
            self.bookkeeping.lock().draining = false;
            let Some(result) = result else { return };
            match result {
                Ok(value) => {
                    if let Some(s) = self.subscriber.lock().as_mut() {
                        s.on_next(value);
                    }
                }
                Err(FluxError::Cancelled) => {
                    self.bookkeeping.lock().done = true;
                    return;
                }
                Err(e) => {
                    self.bookkeeping.lock().done = true;
                    if let Some(s) = self.subscriber.lock().as_mut() {
                        s.on_error(e);
                    }
                    return;
                }
            }
        }
    }

    fn on_flow_notify(&self) {
        {
            let mut bk = self.bookkeeping.lock();
            if bk.done {
                return;
            }
            bk.pending += 1;
        }
        self.drain();
    }

    fn on_flow_terminate(&self) {
        let mut bk = self.bookkeeping.lock();
        if bk.done {
            return;
        }
        bk.done = true;
        drop(bk);
        if let Some(s) = self.subscriber.lock().as_mut() {
            s.on_complete();
        }
    }
}

impl<T: Send + 'static> Subscription for FlowSubscription<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        let should_drain = {
            let mut bk = self.bookkeeping.lock();
            if bk.done {
                return;
            }
            bk.requested = bk.requested.saturating_add(n);
            !bk.setting_up
        };
        if should_drain {
            self.drain();
        }
    }

    fn cancel(&self) {
        let mut bk = self.bookkeeping.lock();
        if !bk.done {
            bk.done = true;
            drop(bk);
            if let Some(t) = self.transfer.lock().as_ref() {
                t.cancel();
            }
        }
    }
}

/// Adapts a [`Flow`] into a foreign [`Publisher`], honoring `request(n)`
/// backpressure exactly: at most `n` `on_next` calls happen per `request`
/// call, though the flow itself is still pulled one transfer at a time.
pub fn publisher<T: Send + 'static>(flow: Flow<T>) -> Box<dyn Publisher<T>> {
    struct FlowPublisher<T> {
        flow: Flow<T>,
    }

    impl<T: Send + 'static> Publisher<T> for FlowPublisher<T> {
        fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T> + Send>) {
            let subscription = Arc::new(FlowSubscription {
                bookkeeping: Mutex::new(Bookkeeping {
                    requested: 0,
                    pending: 0,
                    draining: false,
                    done: false,
                    setting_up: true,
                }),
                transfer: Mutex::new(None),
                subscriber: Mutex::new(Some(subscriber)),
            });

            let notify_subscription = subscription.clone();
            let terminate_subscription = subscription.clone();
            let transfer = self.flow.subscribe(
                move || notify_subscription.on_flow_notify(),
                move || terminate_subscription.on_flow_terminate(),
            );
            *subscription.transfer.lock() = Some(transfer);

            let trait_subscription: Arc<dyn Subscription> = subscription.clone();
            if let Some(s) = subscription.subscriber.lock().as_mut() {
                s.on_subscribe(trait_subscription);
            }

            subscription.bookkeeping.lock().setting_up = false;
            subscription.drain();
        }
    }

    Box::new(FlowPublisher { flow })
}
