//! # Retry Policy
//!
//! Exponential backoff with a capped attempt count. The delay doubles
//! each attempt from the configured base; the payload is never touched
//! between attempts — the same signed bytes go out every time.

use std::time::Duration;

/// Retry policy for transmission operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum total attempts (initial attempt included).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff delay before retry number `retry` (0-based).
    ///
    /// Delays: base, 2×base, 4×base, … The shift saturates so absurd
    /// retry indices do not wrap.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        self.base_delay.saturating_mul(factor.min(u32::MAX as u64) as u32)
    }
}

impl Default for RetryPolicy {
    /// Four attempts with delays of 200ms, 400ms, 800ms between them.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_before_retry(0), Duration::from_millis(200));
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(400));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(800));
    }

    #[test]
    fn huge_retry_index_does_not_wrap() {
        let policy = RetryPolicy::default();
        let d = policy.delay_before_retry(200);
        assert!(d >= policy.delay_before_retry(10));
    }

    #[test]
    fn default_policy_is_four_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(200));
    }
}
