//! Progress events for long-running generations.
//!
//! The retry, poll and submit layers publish structured events to a
//! [`ProgressHub`]; any number of observers (a CLI progress bar, a kiosk
//! display, a log sink) subscribe independently.

use crate::prediction::PredictionStatus;
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Which stage of a generation an event describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Sending the job to the prediction API
    Submitting,
    /// Submission returned; job is queued or running remotely
    Waiting { status: PredictionStatus },
    /// Polling for completion
    Polling { elapsed_secs: u64 },
    /// The job is slower than usual (level 1 is the first warning)
    SlowWarning { elapsed_secs: u64, level: usize },
    /// A failed attempt is about to be retried
    Retrying {
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// Hard timeout reached; asking the remote to stop
    Cancelling,
    /// Output is ready
    Completed,
    /// Terminal failure
    Failed { reason: String },
}

/// A single progress update on a 0–100 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub phase: Phase,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(phase: Phase, percent: u8) -> Self {
        Self {
            phase,
            percent: percent.min(100),
        }
    }
}

/// Broadcast hub for [`ProgressEvent`]s.
///
/// Cloning the hub shares the same channel. Publishing with no subscribers
/// is not an error.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a new observer. It sees events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, phase: Phase, percent: u8) {
        let event = ProgressEvent::new(phase, percent);
        tracing::trace!(?event, "progress");
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }
}

/// Drain every event currently buffered in a receiver.
pub fn drain(receiver: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::debug!("Progress receiver lagged, skipped {skipped} events");
            }
            Err(_) => break,
        }
    }
    events
}
