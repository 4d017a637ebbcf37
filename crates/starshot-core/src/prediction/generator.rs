//! End-to-end generation: submit, poll, retry.

use super::api::PredictionApi;
use super::poller::{PollPolicy, Poller};
use super::types::{ModelRef, Prediction, PredictionInput};
use crate::error::PredictionError;
use crate::progress::{Phase, ProgressHub};
use crate::retry::{retry_with_backoff, RetryConfig, RetryPreset};
use std::sync::Arc;

/// Retry policy for whole submit+poll cycles.
pub const GENERATION_RETRY: RetryPreset = RetryPreset::Standard;

/// Runs predictions to completion with retries, publishing progress.
pub struct Generator {
    api: Arc<dyn PredictionApi>,
    retry: RetryConfig,
    poll: PollPolicy,
    progress: ProgressHub,
}

impl Generator {
    pub fn new(api: Arc<dyn PredictionApi>, poll: PollPolicy) -> Self {
        Self {
            api,
            retry: GENERATION_RETRY.config(),
            poll,
            progress: ProgressHub::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Hub carrying this generator's progress events.
    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    pub fn api(&self) -> &Arc<dyn PredictionApi> {
        &self.api
    }

    /// Generate with `model`, retrying transient failures of the whole cycle.
    pub async fn run(
        &self,
        model: &ModelRef,
        input: &PredictionInput,
    ) -> Result<Prediction, PredictionError> {
        let progress = &self.progress;
        let result = retry_with_backoff(
            &self.retry,
            move || self.attempt(model, input),
            |attempt, err: &PredictionError, delay| {
                progress.emit(
                    Phase::Retrying {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        reason: err.to_string(),
                    },
                    0,
                );
            },
        )
        .await;

        match &result {
            Ok(prediction) => {
                tracing::info!("Prediction {} succeeded", prediction.id);
                self.progress.emit(Phase::Completed, 100);
            }
            Err(e) => {
                tracing::error!("Generation with {model} failed: {e}");
                self.progress.emit(
                    Phase::Failed {
                        reason: e.to_string(),
                    },
                    100,
                );
            }
        }
        result
    }

    /// One submit+poll cycle.
    async fn attempt(
        &self,
        model: &ModelRef,
        input: &PredictionInput,
    ) -> Result<Prediction, PredictionError> {
        self.progress.emit(Phase::Submitting, 10);
        let submitted = self.api.create(model, input).await?;
        self.progress.emit(
            Phase::Waiting {
                status: submitted.status,
            },
            70,
        );

        Poller::new(self.api.as_ref(), &self.poll, &self.progress)
            .wait(submitted)
            .await
    }
}
