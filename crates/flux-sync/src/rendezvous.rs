// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Synchronous, unbuffered rendez-vous channel.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Task};

use crate::waiter::Waiter;

struct State<T> {
    /// Givers waiting for a taker: the value to hand off plus the waiter
    /// representing the giver's own `give` task (completes with `()` once
    /// a taker accepts).
    givers: VecDeque<(T, Waiter<()>)>,
    /// Takers waiting for a giver: the waiter representing the taker's
    /// `take` task (completes with the handed-off value).
    takers: VecDeque<Waiter<T>>,
}

/// A synchronous, unbuffered rendez-vous point. `give` completes only once a
/// taker has accepted the value; `take` completes once a giver hands one
/// off. Both sides are matched in FIFO order independently of each other.
pub struct Rendezvous<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Rendezvous<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Rendezvous<T> {
    /// Create an empty rendez-vous point.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                givers: VecDeque::new(),
                takers: VecDeque::new(),
            })),
        }
    }

    /// A task completing once a taker accepts `value`. Cancellation fails
    /// the pending give and removes it from the queue; it does not affect
    /// other givers or takers, who simply proceed to the next match.
    #[must_use]
    pub fn give(&self, value: T) -> Task<()> {
        let state = self.state.clone();
        Task::new(move |on_success, on_failure| {
            let mut guard = state.lock();
            let mut value = value;
            while let Some(taker) = guard.takers.pop_front() {
                match taker.complete(value) {
                    Ok(()) => {
                        drop(guard);
                        on_success(());
                        return CancelHandle::noop();
                    }
                    Err(v) => value = v,
                }
            }
            let waiter = Waiter::new(on_success, on_failure);
            let cancel = waiter.cancel_handle();
            guard.givers.push_back((value, waiter));
            cancel
        })
    }

    /// A task completing with a value once a giver hands one off.
    /// Cancellation fails the pending take and removes it from the queue.
    #[must_use]
    pub fn take(&self) -> Task<T> {
        let state = self.state.clone();
        Task::new(move |on_success, on_failure| {
            let mut guard = state.lock();
            while let Some((value, giver)) = guard.givers.pop_front() {
                // Wake the giver's `give` task first (it is only waiting
                // on acceptance, not on us consuming the value), then hand
                // the value straight to our own success continuation.
                if giver.complete(()).is_ok() {
                    drop(guard);
                    on_success(value);
                    return CancelHandle::noop();
                }
                // Giver cancelled between enqueue and match: its value is
                // gone with it, move on to the next giver.
            }
            let waiter = Waiter::new(on_success, on_failure);
            let cancel = waiter.cancel_handle();
            guard.takers.push_back(waiter);
            cancel
        })
    }
}

impl<T: Send + 'static> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_before_give_completes_both_sides() {
        let rdv: Rendezvous<i32> = Rendezvous::new();
        let (take_tx, take_rx) = tokio::sync::oneshot::channel();
        rdv.take()
            .subscribe(move |v| { let _ = take_tx.send(v); }, |_| unreachable!());

        let (give_tx, give_rx) = tokio::sync::oneshot::channel();
        rdv.give(5)
            .subscribe(move |()| { let _ = give_tx.send(()); }, |_| unreachable!());

        assert_eq!(take_rx.await.unwrap(), 5);
        give_rx.await.unwrap();
    }

    #[tokio::test]
    async fn cancelling_a_giver_lets_the_next_giver_match() {
        let rdv: Rendezvous<i32> = Rendezvous::new();
        let handle = rdv.give(1).subscribe(|()| panic!("cancelled giver must not fire"), |_| {});
        handle.cancel();

        let (give_tx, give_rx) = tokio::sync::oneshot::channel();
        rdv.give(2)
            .subscribe(move |()| { let _ = give_tx.send(()); }, |_| unreachable!());

        let (take_tx, take_rx) = tokio::sync::oneshot::channel();
        rdv.take()
            .subscribe(move |v| { let _ = take_tx.send(v); }, |_| unreachable!());

        assert_eq!(take_rx.await.unwrap(), 2);
        give_rx.await.unwrap();
    }
}
