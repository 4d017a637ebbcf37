//! Retry utilities for transient prediction failures.
//!
//! Provides retry presets, exponential backoff, and the retry loop that wraps
//! a whole submit+poll cycle.

use crate::error::{ErrorClass, PredictionError};
use std::future::Future;
use std::time::Duration;

/// Errors that know whether repeating the operation could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for PredictionError {
    fn is_retryable(&self) -> bool {
        is_retryable(self)
    }
}

/// Determine whether a prediction error is worth retrying.
///
/// Retryable: timeouts, transport failures, server errors (5xx), remote
/// processing failures. Non-retryable: auth failures, bad requests, missing
/// resources, rate limits.
pub fn is_retryable(error: &PredictionError) -> bool {
    error.class() == ErrorClass::Retryable
}

/// Backoff parameters for one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts is `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

/// Named parameter bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPreset {
    /// Single attempt
    None,
    /// 1 retry, 1s base, 5s cap
    Quick,
    /// 2 retries, 2s base, 10s cap
    #[default]
    Standard,
    /// 3 retries, 3s base, 20s cap
    Patient,
}

impl RetryPreset {
    pub fn config(self) -> RetryConfig {
        match self {
            RetryPreset::None => RetryConfig::new(0, 1000, 1000),
            RetryPreset::Quick => RetryConfig::new(1, 1000, 5000),
            RetryPreset::Standard => RetryConfig::new(2, 2000, 10_000),
            RetryPreset::Patient => RetryConfig::new(3, 3000, 20_000),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPreset::default().config()
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Check `base_delay > 0` and `max_delay >= base_delay`.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("base delay must be > 0".into());
        }
        if self.max_delay < self.base_delay {
            return Err(format!(
                "max delay ({:?}) must be >= base delay ({:?})",
                self.max_delay, self.base_delay
            ));
        }
        Ok(())
    }

    /// Delay inserted after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_duration(attempt, self.base_delay, self.max_delay)
    }
}

/// Calculate exponential backoff after a failed attempt.
///
/// Uses `base_delay * 2^(attempt-1)` capped at `max_delay`; `attempt` is 1-based.
pub fn backoff_duration(attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let base_ms = base_delay.as_millis().min(u64::MAX as u128) as u64;
    let delay = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay).min(max_delay)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget runs out.
///
/// `on_retry(attempt, &error, delay)` is called before each backoff sleep.
/// The returned error is exactly the last attempt's error.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &RetryConfig,
    mut op: F,
    mut on_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
    R: FnMut(u32, &E, Duration),
{
    let total_attempts = config.max_retries.saturating_add(1);
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_retryable() {
                    tracing::debug!("Attempt {attempt} failed with non-retryable error: {e}");
                    return Err(e);
                }
                if attempt >= total_attempts {
                    tracing::debug!("Giving up after {attempt} attempt(s): {e}");
                    return Err(e);
                }

                let delay = config.delay_after(attempt);
                on_retry(attempt, &e, delay);
                tracing::warn!(
                    "Attempt {attempt}/{total_attempts} failed: {e}. Retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
