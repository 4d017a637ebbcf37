//! Wall-clock source for persisted timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix milliseconds.
///
/// Health records are stamped with wall-clock time so they survive restarts;
/// tests substitute a manual clock to age records without waiting.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
