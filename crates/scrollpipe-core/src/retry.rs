//! Retry with exponential backoff for page sources.
//!
//! The pipeline itself never retries; sources wrap their backend calls in
//! [`retry_with_backoff`] when transient failures are expected.

use std::future::Future;
use std::time::Duration;

use crate::error::SourceError;

/// How often and how patiently a source retries one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base × 2^(attempt-1), i.e. 2s, 4s, 8s with the default base
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Retry a fallible source call with exponential backoff.
///
/// `attempt_fn` receives the 0-based attempt number (sources use it to rotate
/// endpoints). Only errors whose [`SourceError::is_retryable`] holds are retried;
/// the final error is returned as-is. Dropping the returned future aborts any
/// pending sleep, so cancellation stays prompt.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    attempt_fn: F,
) -> Result<T, SourceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    retry_when(label, policy, SourceError::is_retryable, attempt_fn).await
}

/// Like [`retry_with_backoff`], retrying only the errors `retryable` accepts
pub async fn retry_when<T, R, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    retryable: R,
    mut attempt_fn: F,
) -> Result<T, SourceError>
where
    R: Fn(&SourceError) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && retryable(&e) => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !e.is_exhausted() {
                    log::error!("{label}: failed permanently: {e}");
                }
                return Err(e);
            }
        }
    }
}
