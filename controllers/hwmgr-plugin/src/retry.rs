//! Retry wrapper for read-modify-write cycles.
//!
//! The closure passed to the wrappers must perform the whole cycle: fetch the
//! object fresh, apply the mutation, and write it back. Every retry therefore
//! starts from the latest stored state. Stale writes (409) and transient API
//! failures are retried with exponential backoff; anything else, or running
//! out of attempts, returns the last error to the caller.
//!
//! The wrappers are generic over any error implementing `RetryClassify`, so a
//! closure may fail with a store error or with a domain error that wraps one.

use crate::store::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Classification the retry wrappers need from an error type.
pub trait RetryClassify {
    /// Write rejected because the object changed since it was read
    fn is_conflict(&self) -> bool;
    /// Transient failure worth retrying immediately
    fn is_retriable(&self) -> bool;
    fn is_not_found(&self) -> bool;
}

impl RetryClassify for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }

    fn is_retriable(&self) -> bool {
        StoreError::is_retriable(self)
    }

    fn is_not_found(&self) -> bool {
        StoreError::is_not_found(self)
    }
}

/// Bounds for a retry loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub steps: u32,
    /// Delay before the second attempt
    pub initial: Duration,
    /// Growth factor applied to the delay after each attempt
    pub factor: f64,
    /// Ceiling on a single delay
    pub cap: Duration,
}

impl Default for RetryPolicy {
    /// Five attempts, 10ms doubling up to 1s.
    fn default() -> Self {
        Self {
            steps: 5,
            initial: Duration::from_millis(10),
            factor: 2.0,
            cap: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (0-indexed) failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.cap.as_secs_f64() {
            self.cap
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Retries `f` while it fails with a conflict or a retriable error.
pub async fn retry_on_conflict_or_retriable<T, E, F, Fut>(policy: &RetryPolicy, f: F) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_when(policy, f, |err: &E, _| err.is_conflict() || err.is_retriable()).await
}

/// As `retry_on_conflict_or_retriable`, additionally tolerating a not-found
/// failure on the first attempt. This covers reading an object whose create
/// has not yet become visible.
pub async fn retry_on_conflict_or_retriable_or_not_found<T, E, F, Fut>(
    policy: &RetryPolicy,
    f: F,
) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_when(policy, f, |err: &E, attempt| {
        err.is_conflict() || err.is_retriable() || (attempt == 0 && err.is_not_found())
    })
    .await
}

async fn retry_when<T, E, F, Fut, P>(policy: &RetryPolicy, mut f: F, retriable: P) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E, u32) -> bool,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < policy.steps && retriable(&err, attempt) => {
                let delay = policy.delay(attempt);
                debug!("Attempt {} failed ({}), retrying in {:?}", attempt + 1, err, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(steps: u32) -> RetryPolicy {
        RetryPolicy {
            steps,
            initial: Duration::from_millis(1),
            factor: 2.0,
            cap: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_grows_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(80));
        assert_eq!(policy.delay(10), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_conflicts_then_success_runs_n_plus_one_cycles() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, StoreError> = retry_on_conflict_or_retriable(&fast_policy(10), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                Err(StoreError::Conflict("stale".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.expect("succeeds after conflicts"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), StoreError> = retry_on_conflict_or_retriable(&fast_policy(3), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Retriable(format!("attempt {}", n)))
        })
        .await;

        match result {
            Err(StoreError::Retriable(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), StoreError> = retry_on_conflict_or_retriable(&fast_policy(5), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("gone".to_string()))
        })
        .await;

        assert!(result.expect_err("not retried").is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_tolerated_on_first_attempt_only() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, StoreError> = retry_on_conflict_or_retriable_or_not_found(&fast_policy(5), || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(StoreError::NotFound("not yet visible".to_string())),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(result.expect("second attempt succeeds"), 1);

        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), StoreError> = retry_on_conflict_or_retriable_or_not_found(&fast_policy(5), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("really gone".to_string()))
        })
        .await;
        assert!(result.expect_err("second not-found is fatal").is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
