// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Counted semaphore with FIFO-served waiters and a scoped `holding` helper.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Task};

use crate::waiter::Waiter;

struct State {
    tokens: usize,
    waiters: VecDeque<Waiter<()>>,
}

/// A counted semaphore. `n = 1` behaves as a mutex. Waiters are served in
/// FIFO order; cancelling a pending `acquire` fails it without consuming a
/// token.
#[derive(Clone)]
pub struct Semaphore {
    state: Arc<Mutex<State>>,
}

impl Semaphore {
    /// Create a semaphore with `n` initial tokens.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tokens: n,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Return a token to the pool, or hand it directly to the
    /// longest-waiting `acquire` if one is pending.
    pub fn release(&self) {
        let mut guard = self.state.lock();
        while let Some(waiter) = guard.waiters.pop_front() {
            match waiter.complete(()) {
                Ok(()) => return,
                Err(()) => continue,
            }
        }
        guard.tokens += 1;
    }

    /// A task completing once a token is available; completion atomically
    /// consumes it. Cancelling a pending acquire fails it and leaves the
    /// token pool untouched.
    #[must_use]
    pub fn acquire(&self) -> Task<()> {
        let state = self.state.clone();
        Task::new(move |on_success, on_failure| {
            let mut guard = state.lock();
            if guard.tokens > 0 {
                guard.tokens -= 1;
                drop(guard);
                on_success(());
                return CancelHandle::noop();
            }
            let waiter = Waiter::new(on_success, on_failure);
            let cancel = waiter.cancel_handle();
            guard.waiters.push_back(waiter);
            cancel
        })
    }

    /// Current token count (diagnostics only; racy under concurrent use).
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().tokens
    }
}

/// Run `body` while holding a token from `sem`, releasing it on every exit
/// path: normal completion, failure, or cancellation. If acquiring the
/// token itself fails or is cancelled, `body` never runs and nothing is
/// released (there was nothing to release).
pub fn holding<T: Send + 'static>(
    sem: Semaphore,
    body: impl FnOnce() -> Task<T> + Send + 'static,
) -> Task<T> {
    let release_sem = sem.clone();
    sem.acquire()
        .and_then(move |()| body().on_terminate(move || release_sem.release()))
}
