// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Unbounded FIFO mailbox.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Task};

use crate::waiter::Waiter;

struct State<T> {
    queue: VecDeque<T>,
    waiters: VecDeque<Waiter<T>>,
}

/// An unbounded FIFO mailbox. `post` never blocks; `fetch` is a task that
/// pops the head or waits for one to arrive. Posts made while a `fetch` is
/// pending or cancelled are still enqueued and served in order.
pub struct Mailbox<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Mailbox<T> {
    /// Create an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                queue: VecDeque::new(),
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Enqueue `value`. If a `fetch` is already waiting, hand it off
    /// directly (FIFO on both sides) instead of round-tripping the queue.
    pub fn post(&self, value: T) {
        let mut guard = self.state.lock();
        let mut value = value;
        while let Some(waiter) = guard.waiters.pop_front() {
            match waiter.complete(value) {
                Ok(()) => return,
                // Waiter was cancelled between enqueue and delivery; drop it
                // and try the next one with the same value.
                Err(v) => value = v,
            }
        }
        guard.queue.push_back(value);
    }

    /// A task popping the head of the mailbox, waiting if empty. Cancelling
    /// a pending fetch fails it; it does not consume a queued value.
    #[must_use]
    pub fn fetch(&self) -> Task<T> {
        let state = self.state.clone();
        Task::new(move |on_success, on_failure| {
            let mut guard = state.lock();
            if let Some(value) = guard.queue.pop_front() {
                drop(guard);
                on_success(value);
                return CancelHandle::noop();
            }
            let waiter = Waiter::new(on_success, on_failure);
            let cancel = waiter.cancel_handle();
            guard.waiters.push_back(waiter);
            cancel
        })
    }

    /// Number of values currently queued (diagnostics only; racy under
    /// concurrent posts).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// True if no values are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_before_post_waits_then_delivers() {
        let mailbox: Mailbox<i32> = Mailbox::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        mailbox.fetch().subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        mailbox.post(7);
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn posts_queue_fifo_when_nobody_is_fetching() {
        let mailbox: Mailbox<i32> = Mailbox::new();
        mailbox.post(1);
        mailbox.post(2);
        assert_eq!(mailbox.len(), 2);

        let (tx1, rx1) = tokio::sync::oneshot::channel();
        mailbox.fetch().subscribe(move |v| { let _ = tx1.send(v); }, |_| unreachable!());
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        mailbox.fetch().subscribe(move |v| { let _ = tx2.send(v); }, |_| unreachable!());

        assert_eq!(rx1.await.unwrap(), 1);
        assert_eq!(rx2.await.unwrap(), 2);
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_pending_fetch_does_not_consume_the_next_post() {
        let mailbox: Mailbox<i32> = Mailbox::new();
        let handle = mailbox
            .fetch()
            .subscribe(|_| panic!("should be cancelled, not completed"), |_| {});
        handle.cancel();

        let (tx, rx) = tokio::sync::oneshot::channel();
        mailbox.fetch().subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not fail"),
        );
        mailbox.post(99);
        assert_eq!(rx.await.unwrap(), 99);
    }
}
