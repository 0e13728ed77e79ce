// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `compel`: run a task to completion regardless of the consumer's wishes.

use flux_core::{CancelHandle, Task};

/// Subscribe to `t` but hide cancellation from it: the returned handle's
/// `cancel()` is a no-op, so `t` always runs to its own natural completion.
pub fn compel<T: Send + 'static>(t: Task<T>) -> Task<T> {
    Task::new(move |on_success, on_failure| {
        t.subscribe(on_success, on_failure);
        CancelHandle::noop()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_hidden_from_the_inner_task() {
        let completed = Arc::new(AtomicBool::new(false));
        let completed2 = completed.clone();
        let t = flux_sync::sleep(Duration::from_millis(50), ()).map(move |()| {
            completed2.store(true, Ordering::SeqCst);
        });
        let handle = compel(t).subscribe(|()| {}, |_| panic!("should not fail"));
        handle.cancel();
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(completed.load(Ordering::SeqCst));
    }
}
