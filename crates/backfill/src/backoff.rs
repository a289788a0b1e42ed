//! Exponential backoff policy for transient fetch failures.

use std::time::Duration;

/// Exponent clamp so a corrupt persisted retry count cannot produce an
/// absurd sleep (2^6 = 64s ceiling).
const MAX_EXPONENT: i64 = 6;

/// Bounded exponential backoff: the Nth retry (zero-based count N-1)
/// waits `2^(N-1)` seconds, and the budget allows `max_retries` attempts
/// before the run gives up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether `retry_count` consumed the whole budget.
    pub fn is_exhausted(&self, retry_count: i64) -> bool {
        retry_count >= i64::from(self.max_retries)
    }

    /// Sleep before the next attempt, given the retries already made.
    pub fn delay_for(&self, retry_count: i64) -> Duration {
        let exponent = retry_count.clamp(0, MAX_EXPONENT) as u32;
        Duration::from_secs(1u64 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_clamped() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.delay_for(40), Duration::from_secs(64));
        assert_eq!(policy.delay_for(-3), Duration::from_secs(1));
    }

    #[test]
    fn test_budget() {
        let policy = RetryPolicy::new(5);
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }
}
