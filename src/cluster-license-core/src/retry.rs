//! Retry with exponential backoff for store calls.
//!
//! Only transient failures ([`StoreError::is_transient`]) are retried.
//! Conflicts, missing objects and invalid objects are returned immediately;
//! the controller handles those at the pass level.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::StoreError;

/// Backoff settings for a single store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 retries at 200ms, 400ms, 800ms.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// `base * 2^attempt`, capped at `max`.
#[must_use]
pub fn exponential_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

/// Run `f` until it succeeds, fails permanently, or the policy runs out.
///
/// `f` is called at most `policy.max_retries + 1` times.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    f: F,
) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    for attempt in 0..policy.max_retries {
        match f().await {
            Err(e) if e.is_transient() => {
                let delay = exponential_delay(policy.base_delay, attempt, Duration::MAX);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "Store call failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            },
            other => return other,
        }
    }
    f().await
}
