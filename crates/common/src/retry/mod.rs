//! Retry policy executor
//!
//! One policy value (attempt count + fixed backoff) applied uniformly by the
//! catalog client and the dispatcher, instead of per-call-site sleep loops.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// A fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds, the error is not retryable, or attempts
    /// are exhausted; the last error is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "{} failed, retrying",
                        label
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> = policy(3)
            .run(
                "op",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> = policy(4)
            .run(
                "op",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("boom".to_string())
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_recovers_mid_flight() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> = policy(3)
            .run(
                "op",
                move || async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> = policy(5)
            .run(
                "op",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("permanent".to_string())
                },
                |err| err != "permanent",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<(), String> = policy(0)
            .run(
                "op",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("boom".to_string())
                },
                |_| true,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
