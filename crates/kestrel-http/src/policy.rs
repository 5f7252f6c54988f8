//! Retry and backoff policy.

use std::time::Duration;

/// Retry configuration shared by every call a client makes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts beyond the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Multiplier applied per retry (never below 1.0).
    pub backoff_factor: f64,
    /// Wall-clock budget for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, clamping the factor to at least 1.0.
    pub fn new(
        max_retries: u32,
        backoff_base: Duration,
        backoff_factor: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_factor: clamp_factor(backoff_factor),
            timeout,
        }
    }

    /// A policy that never retries.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            timeout,
            ..Self::default()
        }
    }

    /// Total number of attempts a call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `attempt` (0-indexed) is the last one allowed.
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }

    /// Delay to wait before `attempt` (0-indexed); attempt 0 has none.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = clamp_factor(self.backoff_factor).powi(exponent);
        let millis = self.backoff_base.as_secs_f64() * 1000.0 * factor;
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Some(Duration::from_millis(u64::MAX));
        }
        Some(Duration::from_millis(millis.round() as u64))
    }
}

fn clamp_factor(factor: f64) -> f64 {
    if factor.is_nan() || factor < 1.0 {
        1.0
    } else {
        factor
    }
}
