//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration; every limit is optional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Max concurrently executing calls (unbounded when absent)
    #[serde(default)]
    pub max_concurrent_calls: Option<u32>,

    /// Max execution attempts before a call fails terminally
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Delay before a retried call becomes eligible again, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Max dispatches per rolling interval; needs `interval_length_ms`
    #[serde(default)]
    pub max_calls_per_interval: Option<u32>,

    /// Rolling interval length in milliseconds; needs `max_calls_per_interval`
    #[serde(default)]
    pub interval_length_ms: Option<u64>,
}

fn default_max_retry_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: None,
            max_retry_attempts: 10,
            retry_delay_ms: 1000,
            max_calls_per_interval: None,
            interval_length_ms: None,
        }
    }
}

impl PacerConfig {
    /// Get the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Rate limiting is active only when both halves are configured.
    ///
    /// Returns `(max_calls, interval_length_ms)`, or None when disabled.
    pub fn rate_limit(&self) -> Option<(u32, u64)> {
        match (self.max_calls_per_interval, self.interval_length_ms) {
            (Some(max), Some(len)) => Some((max, len)),
            _ => None,
        }
    }
}
