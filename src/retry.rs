//! # Retry Policy
//!
//! Bounded exponential backoff expressed as data. Actions carry their own
//! policy and the coordination client receives one at construction, so no
//! retry constant is compiled into client code.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            ..Self::default()
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = max_backoff.as_millis() as u64;
        self
    }

    /// Delay to sleep after `failed_attempt` (1-based) before trying again
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failed_attempt` (1-based)
    pub fn allows_retry_after(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        }
    }
}
