// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `timeout`: no privileged timer wheel, just `race` against `sleep`.

use std::time::Duration;

use flux_core::Task;
use flux_error::FluxError;

use crate::attempt::{attempt, Thunk};
use crate::race::race;

/// `timeout(duration, t)`, defined exactly as the spec does:
/// `absolve(race(sleep(duration, failing-thunk), attempt(t)))`.
///
/// If `t` completes within `duration` its outcome (success or failure)
/// passes through unchanged. Otherwise `t` is cancelled and the composite
/// fails with [`FluxError::Timeout`].
pub fn timeout<T: Send + 'static>(duration: Duration, t: Task<T>) -> Task<T> {
    let timeout_thunk: Thunk<T> = Box::new(move || Err(FluxError::timeout(duration)));
    let timer = flux_sync::sleep(duration, timeout_thunk);
    let attempted = attempt(t);
    crate::attempt::absolve(race(vec![timer, attempted]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completes_with_value_when_faster_than_deadline() {
        let t = flux_sync::sleep(Duration::from_millis(10), 42);
        let (tx, rx) = tokio::sync::oneshot::channel();
        timeout(Duration::from_secs(1), t).subscribe(
            move |v| {
                let _ = tx.send(v);
            },
            |_| panic!("should not time out"),
        );
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_with_timeout_when_slower_than_deadline() {
        let t = flux_sync::sleep(Duration::from_secs(10), 42);
        let (tx, rx) = tokio::sync::oneshot::channel();
        timeout(Duration::from_millis(50), t).subscribe(
            |_| panic!("should time out"),
            move |e| {
                let _ = tx.send(e);
            },
        );
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(rx.await.unwrap().is_timeout());
    }
}
