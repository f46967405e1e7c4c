// Exponential backoff with optional jitter
use std::time::Duration;

use rand::Rng;

use crate::error::{CommonError, CommonResult};
use crate::sync::retry::constants::{
    BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY,
    MAX_BACKOFF_EXPONENT,
};

/// Delay schedule for failed queue operations
///
/// `delay_for(n)` is `base_delay * 2^n`, capped at `max_delay`, where `n` is
/// the operation's retry count after the failure was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with validation
    pub fn new(base_delay: Duration, max_delay: Duration) -> CommonResult<Self> {
        if base_delay.is_zero() {
            return Err(CommonError::config_field("base_delay", "must be greater than zero"));
        }
        if base_delay > max_delay {
            return Err(CommonError::config(format!(
                "base_delay ({base_delay:?}) cannot be greater than max_delay ({max_delay:?})"
            )));
        }
        Ok(Self { base_delay, max_delay, jitter_factor: DEFAULT_JITTER_FACTOR })
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Delay before an operation with `retry_count` recorded failures becomes
    /// eligible again
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.apply_jitter(self.exponential_delay(retry_count))
    }

    fn exponential_delay(&self, retry_count: u32) -> Duration {
        let base_millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
        let multiplier = BACKOFF_MULTIPLIER.saturating_pow(exponent);

        Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
    }

    /// Spread the delay by +/- half the jitter range, never past the cap
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let mut rng = rand::thread_rng();
        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_factor;

        let jitter = rng.gen_range(-jitter_range / 2.0..=jitter_range / 2.0);
        let final_millis = (delay_millis + jitter).max(0.0) as u64;

        Duration::from_millis(final_millis).min(self.max_delay)
    }
}
