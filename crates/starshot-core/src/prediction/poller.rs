//! Polling loop for predictions that outlive the synchronous wait window.
//!
//! The remote model's runtime varies a lot between identical requests, so the
//! poller warns as a job runs long and gives up (cancelling the job) at a hard
//! cap instead of waiting forever.

use super::api::PredictionApi;
use super::types::Prediction;
use crate::config::PollConfig;
use crate::error::PredictionError;
use crate::progress::{Phase, ProgressHub};
use std::time::Duration;

/// Progress range covered while polling.
const POLL_PERCENT_START: u8 = 80;
const POLL_PERCENT_END: u8 = 95;

/// Timing policy for one polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between polls
    pub interval: Duration,
    /// Elapsed times at which a one-time "taking longer" warning fires
    pub warn_after: Vec<Duration>,
    /// Elapsed time after which the job is cancelled
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            warn_after: vec![Duration::from_secs(60), Duration::from_secs(90)],
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        let mut warn_after: Vec<_> = config
            .warn_after_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();
        warn_after.sort();
        Self {
            interval: Duration::from_millis(config.interval_ms),
            warn_after,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl PollPolicy {
    /// Map elapsed time onto the 80–95 progress band.
    pub fn percent_at(&self, elapsed: Duration) -> u8 {
        if self.timeout.is_zero() {
            return POLL_PERCENT_END;
        }
        let span = u128::from(POLL_PERCENT_END - POLL_PERCENT_START);
        let step = span * elapsed.as_millis() / self.timeout.as_millis();
        POLL_PERCENT_START.saturating_add(step.min(span) as u8)
    }
}

/// Drives a submitted prediction to a terminal state.
pub struct Poller<'a> {
    api: &'a dyn PredictionApi,
    policy: &'a PollPolicy,
    progress: &'a ProgressHub,
}

impl<'a> Poller<'a> {
    pub fn new(api: &'a dyn PredictionApi, policy: &'a PollPolicy, progress: &'a ProgressHub) -> Self {
        Self {
            api,
            policy,
            progress,
        }
    }

    /// Poll until `prediction` succeeds, fails, or runs past the hard cap.
    ///
    /// Terminal predictions are resolved without any request.
    pub async fn wait(&self, prediction: Prediction) -> Result<Prediction, PredictionError> {
        let id = prediction.id.clone();
        let mut current = prediction;
        // Sum of poll intervals; time spent inside requests is not counted.
        let mut elapsed = Duration::ZERO;
        let mut warned = vec![false; self.policy.warn_after.len()];

        loop {
            if current.is_terminal() {
                tracing::debug!(
                    "Prediction {id} finished with status {} after {}s of polling",
                    current.status,
                    elapsed.as_secs()
                );
                return current.into_result();
            }

            for (level, threshold) in self.policy.warn_after.iter().enumerate() {
                if !warned[level] && elapsed >= *threshold {
                    warned[level] = true;
                    tracing::warn!(
                        "Prediction {id} is taking longer than usual ({}s, still {})",
                        elapsed.as_secs(),
                        current.status
                    );
                    self.progress.emit(
                        Phase::SlowWarning {
                            elapsed_secs: elapsed.as_secs(),
                            level: level + 1,
                        },
                        self.policy.percent_at(elapsed),
                    );
                }
            }

            if elapsed >= self.policy.timeout {
                tracing::error!(
                    "Prediction {id} still {} after {}s, cancelling",
                    current.status,
                    elapsed.as_secs()
                );
                self.progress
                    .emit(Phase::Cancelling, self.policy.percent_at(elapsed));
                self.cancel_quietly(&id).await;
                return Err(PredictionError::TimedOut {
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            tokio::time::sleep(self.policy.interval).await;
            elapsed += self.policy.interval;
            self.progress.emit(
                Phase::Polling {
                    elapsed_secs: elapsed.as_secs(),
                },
                self.policy.percent_at(elapsed),
            );

            match self.api.get(&id).await {
                Ok(next) => {
                    if next.status != current.status {
                        tracing::info!("Prediction {id}: {} -> {}", current.status, next.status);
                    }
                    current = next;
                }
                Err(e) if e.is_request_level() => return Err(e),
                Err(e) => {
                    tracing::warn!("Poll for prediction {id} failed, will retry: {e}");
                }
            }
        }
    }

    /// Best-effort remote cancel. Failures are logged, never returned.
    pub async fn cancel_quietly(&self, id: &str) {
        match self.api.cancel(id).await {
            Ok(()) => tracing::info!("Cancelled prediction {id}"),
            Err(e) => tracing::warn!("Failed to cancel prediction {id}: {e}"),
        }
    }
}
