//! # Exponential Backoff
//!
//! Error-driven retry delays for failed reconcile passes. Expected "not yet"
//! states (cluster not ready, instance still provisioning) use fixed requeues
//! instead and never touch this state.
//!
//! Sequence with the defaults: 5s, 10s, 20s, 40s, 80s, 160s, 300s (max).

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each delay doubles the previous one, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current backoff value in seconds
    current_secs: u64,
    /// Maximum backoff value in seconds
    max_secs: u64,
}

impl ExponentialBackoff {
    /// Create a new backoff starting at `min` and capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        let max_secs = max.as_secs().max(min_secs);
        Self {
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        self.current_secs = self.current_secs.saturating_mul(2).min(self.max_secs);
        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}
