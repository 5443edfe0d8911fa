//! 재시도 정책 - 페이지 단위 재시도 백오프 계산
//!
//! Exponential backoff with jitter for failed page fetches. Only
//! [`SourceError::Unavailable`] is ever retried; an expired credential stays
//! expired no matter how long we wait.

use std::time::Duration;

use tracing::debug;

use crate::domain::errors::SourceError;
use crate::infrastructure::config::SyncConfig;

/// Backoff schedule for consecutive failures of the same page.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures after which the run gives up
    pub max_consecutive_failures: u32,
    /// Fraction of the computed delay added or removed at random (0.0 ~ 1.0)
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_consecutive_failures: 3,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            max_consecutive_failures: config.consecutive_failure_threshold,
            ..Self::default()
        }
    }

    /// No waiting at all; used by tests that script failures.
    pub const fn immediate(max_consecutive_failures: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_consecutive_failures,
            jitter_ratio: 0.0,
        }
    }

    /// Whether `error` after `failures` consecutive failures should be retried.
    pub fn should_retry(&self, error: &SourceError, failures: u32) -> bool {
        error.is_retryable() && failures < self.max_consecutive_failures
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base_ms = self.base_delay.as_millis() as u64;
        let raw_ms = base_ms.saturating_mul(1u64 << exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as u64);

        let delay_ms = if self.jitter_ratio > 0.0 && capped_ms > 0 {
            let spread = capped_ms as f64 * self.jitter_ratio;
            let jitter = (fastrand::f64() * 2.0 - 1.0) * spread;
            ((capped_ms as f64 + jitter).max(0.0) as u64).min(self.max_delay.as_millis() as u64)
        } else {
            capped_ms
        };

        debug!("⏳ Retry backoff: attempt={}, delay={}ms", attempt, delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_ratio: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[rstest]
    #[case(1, 1000)]
    #[case(2, 2000)]
    #[case(3, 4000)]
    #[case(5, 16_000)]
    #[case(6, 30_000)]
    #[case(40, 30_000)]
    fn test_exponential_backoff_is_capped(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(no_jitter().delay_for(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(2).as_millis() as u64;
            assert!((1500..=2500).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_auth_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&SourceError::AuthExpired { status: 401 }, 0));
        assert!(policy.should_retry(&SourceError::unavailable(1, "timeout"), 2));
        assert!(!policy.should_retry(&SourceError::unavailable(1, "timeout"), 3));
    }
}
