//! Geometric backoff policy shared by delivery retries and channel reconnects.

use std::time::Duration;

/// Delay schedule for retrying a failed operation.
///
/// The delay for attempt `n` (1-based) is `base_delay * growth^(n-1)`,
/// capped at `cap_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt (the first retry).
    pub base_delay: Duration,
    /// Geometric growth factor between consecutive delays.
    pub growth: f64,
    /// Upper bound on any single delay.
    pub cap_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            growth: 1.5,
            cap_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given attempt number (1-based).
    ///
    /// Attempt 0 is treated as attempt 1 so a miscounted caller still
    /// waits `base_delay` rather than zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw_ms = self.base_delay.as_millis() as f64 * self.growth.powi(exponent);
        let capped_ms = raw_ms.min(self.cap_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.round() as u64)
    }
}
