//! Retry policy arithmetic.
//!
//! The runtime drives the actual retry loop; this type only describes it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff, without jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total invocations, including the first
    pub max_attempts: u32,

    #[serde(with = "crate::config::duration")]
    pub initial_delay: Duration,

    #[serde(with = "crate::config::duration")]
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Retries allowed after the first invocation.
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Sleep before retry `n` (1-based): `min(initial * multiplier^(n-1), max)`.
    pub fn delay_for(&self, n: u32) -> Duration {
        if n == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(n.saturating_sub(1) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// The whole sleep schedule, one entry per retry.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.retries()).map(|n| self.delay_for(n)).collect()
    }
}
