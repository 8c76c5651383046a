//! Bounded retry policy for stream writes
//!
//! Attempts are numbered from 1. The wait after failed attempt `n` grows
//! linearly: `n * write_timeout`.

use crate::config::DestinationConfig;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per batch, including the first
    pub max_retries: u32,
    /// Backoff unit
    pub write_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::types::DEFAULT_MAX_RETRIES,
            write_timeout: crate::config::types::DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, write_timeout: Duration) -> Self {
        Self {
            max_retries,
            write_timeout,
        }
    }

    pub fn from_config(config: &DestinationConfig) -> Self {
        Self::new(config.max_retries, config.write_timeout)
    }

    /// Whether attempt number `attempt` may run
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Delay after the failed attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.write_timeout.saturating_mul(attempt)
    }
}
