//! Retry policy for durable writes.

use std::time::Duration;

use crate::{BASE_STORE_RETRY_DELAY_MS, MAX_STORE_ATTEMPTS};

/// Bounded exponential backoff applied to failed store writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the write is dropped.
    pub max_attempts: u32,

    /// Base delay between attempts (exponential backoff applied).
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_STORE_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_STORE_RETRY_DELAY_MS),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.pow(attempt.saturating_sub(1).min(16));
        let delay = self.base_delay.saturating_mul(multiplier as u32);
        delay.min(self.max_delay)
    }

    /// Check if more attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
