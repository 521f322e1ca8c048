//! Reusable retry loop with pluggable backoff and retryability.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::error::{ApiError, RetryClass};

/// First rate-limit wait; doubles per attempt (30s, 60s, 120s).
const RATE_LIMIT_BASE_SECS: u64 = 30;

/// Upstream timeout/unavailable wait; grows linearly (30s, 60s, 90s).
const TRANSIENT_BASE_SECS: u64 = 30;

/// Fixed wait for other recoverable errors.
const GENERIC_WAIT_SECS: u64 = 15;

/// Initial backoff for interactive (per-point) requests; doubles per attempt.
const INTERACTIVE_BACKOFF_MS: u64 = 1000;

type BackoffFn<E> = Arc<dyn Fn(u32, &E) -> Duration + Send + Sync>;
type RetryableFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// `max_attempts` total tries; `backoff(attempt, error)` is the wait after
/// the zero-based `attempt` failed; `retryable(error)` gates any retry.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: BackoffFn<E>,
    retryable: RetryableFn<E>,
}

// Manual impl: the derive would demand `E: Clone`.
impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            retryable: Arc::clone(&self.retryable),
        }
    }
}

impl<E> RetryPolicy<E> {
    pub fn new(
        max_attempts: u32,
        backoff: impl Fn(u32, &E) -> Duration + Send + Sync + 'static,
        retryable: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
            retryable: Arc::new(retryable),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self, attempt: u32, error: &E) -> Duration {
        (self.backoff)(attempt, error)
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }
}

impl RetryPolicy<ApiError> {
    /// Schedule for bulk feature downloads against a shared public server.
    pub fn bulk_download(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            |attempt, error: &ApiError| match error.retry_class() {
                RetryClass::RateLimited(Some(wait)) => wait,
                RetryClass::RateLimited(None) => {
                    Duration::from_secs(RATE_LIMIT_BASE_SECS << attempt.min(16))
                }
                RetryClass::Transient => {
                    Duration::from_secs(TRANSIENT_BASE_SECS * (u64::from(attempt) + 1))
                }
                RetryClass::Generic | RetryClass::Fatal => Duration::from_secs(GENERIC_WAIT_SECS),
            },
            |error| error.retry_class() != RetryClass::Fatal,
        )
    }

    /// Short schedule for per-point requests: only rate limits and transient
    /// failures are retried.
    pub fn interactive(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            |attempt, error: &ApiError| match error.retry_class() {
                RetryClass::RateLimited(Some(wait)) => wait,
                _ => Duration::from_millis(INTERACTIVE_BACKOFF_MS << attempt.min(16)),
            },
            |error| {
                matches!(
                    error.retry_class(),
                    RetryClass::RateLimited(_) | RetryClass::Transient
                )
            },
        )
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts. `operation` receives the zero-based attempt number.
/// There is no wait after the final attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let attempts_left = attempt + 1 < policy.max_attempts;
                if !attempts_left || !policy.is_retryable(&error) {
                    return Err(error);
                }
                let wait = policy.backoff(attempt, &error);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    error = %error,
                    "Request failed, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
