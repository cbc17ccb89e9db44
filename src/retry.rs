// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fixed-Delay Retry Loops
//!
//! Everything here polls with a fixed delay: no backoff and no jitter. Most
//! loops are unbounded and rely on the caller's outer timeout; a few waits
//! (leader transfer, peering activation) carry an attempt budget.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// How long to wait between attempts, and how many attempts to make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries until success or abort
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Finished with a value
    Done(T),
    /// Not there yet; the reason is logged and the loop sleeps
    Again(String),
    /// Unrecoverable; stop immediately
    Abort(E),
}

/// Why a retry loop gave up
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("{0}")]
    Aborted(E),

    #[error("{operation} did not succeed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

/// Poll `attempt` until it reports [`Attempt::Done`] or [`Attempt::Abort`].
pub async fn retry_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt().await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Abort(err) => return Err(RetryError::Aborted(err)),
            Attempt::Again(reason) => {
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts,
                        last: reason,
                    });
                }
                debug!(
                    operation,
                    attempt = attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    %reason,
                    "retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// Retry a fallible call while `is_transient` classifies its error as
/// retryable. Any other error aborts the loop.
pub async fn retry_on<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_transient: P,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let is_transient = &is_transient;
    retry_until(policy, operation, move || {
        let fut = call();
        async move {
            match fut.await {
                Ok(value) => Attempt::Done(value),
                Err(err) if is_transient(&err) => Attempt::Again(err.to_string()),
                Err(err) => Attempt::Abort(err),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy::forever(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retry_until_eventually_done() {
        let calls = &AtomicU32::new(0);
        let out: Result<u32, RetryError<String>> = retry_until(&instant(), "count", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Attempt::Again(format!("only {n}"))
            } else {
                Attempt::Done(n)
            }
        })
        .await;

        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_until_exhausts_budget() {
        let policy = RetryPolicy::bounded(Duration::ZERO, 4);
        let out: Result<(), RetryError<String>> =
            retry_until(&policy, "leader transfer", || async {
                Attempt::Again("leader unchanged".to_string())
            })
            .await;

        assert_eq!(
            out,
            Err(RetryError::Exhausted {
                operation: "leader transfer".into(),
                attempts: 4,
                last: "leader unchanged".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_retry_on_aborts_on_permanent_error() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), RetryError<String>> = retry_on(
            &instant(),
            "write",
            |e: &String| e == "transient",
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("transient".to_string())
                } else {
                    Err("permanent".to_string())
                }
            },
        )
        .await;

        assert_eq!(out, Err(RetryError::Aborted("permanent".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_on_returns_first_success() {
        let out: Result<&str, RetryError<String>> = tokio_test::block_on(retry_on(
            &RetryPolicy::bounded(Duration::ZERO, 1),
            "read",
            |_: &String| true,
            || async { Ok("value") },
        ));
        tokio_test::assert_ok!(&out);
        assert_eq!(out, Ok("value"));
    }
}
