//! Bounded exponential backoff for transient provider failures.

use std::time::Duration;

use rand::Rng;

use agora_core::defaults::{MAX_RETRIES, RETRY_BASE_MS, RETRY_MAX_MS};

/// Retry policy for one provider in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base: Duration::from_millis(RETRY_BASE_MS),
            max: Duration::from_millis(RETRY_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Whether a call that has already been retried `retries` times may retry again.
    pub fn allows(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Exponential in `retry` with jitter over the upper half of the step,
    /// raised to the provider's `retry_after` hint and capped at `max`.
    pub fn delay_for(&self, retry: u32, retry_after_secs: Option<u64>) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let step = self
            .base
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
            .min(self.max);
        let half = step / 2;
        let jitter_ms = if half.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=half.as_millis() as u64)
        };
        let delay = half + Duration::from_millis(jitter_ms);
        let hinted = retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);
        delay.max(hinted).min(self.max)
    }
}
