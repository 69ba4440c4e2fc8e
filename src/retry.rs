//! Retry policy evaluation for forward steps

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FailureKind, StepError};

/// Retry policy for a single activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Backoff multiplier applied per retry
    pub backoff_coefficient: f64,
    /// Maximum delay cap
    pub maximum_interval: Duration,
    /// Maximum number of attempts, `None` retries without bound
    pub maximum_attempts: Option<u32>,
    /// Failure kinds that abort without retrying
    pub non_retryable_kinds: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    /// Unbounded exponential backoff: 1s doubling up to 100s
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: None,
            non_retryable_kinds: vec![FailureKind::NonRetryable],
        }
    }
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for `delay`, then attempt again
    RetryAfter(Duration),
    /// The attempt budget is spent
    Exhausted,
    /// The failure kind must not be retried
    NonRetryable,
}

impl RetryPolicy {
    /// Constant-interval policy bounded to `maximum_attempts`
    pub fn constant(interval: Duration, maximum_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            backoff_coefficient: 1.0,
            maximum_interval: interval,
            maximum_attempts: Some(maximum_attempts.max(1)),
            ..Self::default()
        }
    }

    /// Set the failure kinds that are never retried
    pub fn with_non_retryable_kinds(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.non_retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Calculate the delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_interval.as_secs_f64();
        let delay = base * self.backoff_coefficient
            .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let capped = delay.min(self.maximum_interval.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.maximum_interval
        }
    }

    /// Decide how to continue after `attempt` failed with `error`
    pub fn evaluate(&self, attempt: u32, error: &StepError) -> RetryDecision {
        if self.non_retryable_kinds.contains(&error.kind()) {
            return RetryDecision::NonRetryable;
        }
        match self.maximum_attempts {
            Some(max) if attempt >= max => RetryDecision::Exhausted,
            _ => RetryDecision::RetryAfter(self.delay_for_attempt(attempt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        // Would be 512s but capped at max
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(100));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(100));
    }

    #[test]
    fn test_constant_policy_does_not_grow() {
        let policy = RetryPolicy::constant(Duration::from_secs(1), 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
    }

    #[test]
    fn test_bounded_policy_exhausts() {
        let policy = RetryPolicy::constant(Duration::from_secs(1), 3);
        let err = StepError::retryable("flight service is down");

        assert_eq!(
            policy.evaluate(1, &err),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.evaluate(2, &err),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(policy.evaluate(3, &err), RetryDecision::Exhausted);
    }

    #[test]
    fn test_non_retryable_ignores_budget() {
        let policy = RetryPolicy::default();
        let err = StepError::non_retryable("invalid car id");
        assert_eq!(policy.evaluate(1, &err), RetryDecision::NonRetryable);
    }

    #[test]
    fn test_timeout_is_retried_unless_listed() {
        let timeout = StepError::Timeout {
            after: Duration::from_secs(10),
        };
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.evaluate(7, &timeout),
            RetryDecision::RetryAfter(_)
        ));

        let strict = RetryPolicy::default()
            .with_non_retryable_kinds([FailureKind::NonRetryable, FailureKind::Timeout]);
        assert_eq!(strict.evaluate(1, &timeout), RetryDecision::NonRetryable);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let policy = RetryPolicy::constant(Duration::from_secs(1), 0);
        assert_eq!(policy.maximum_attempts, Some(1));
        assert_eq!(
            policy.evaluate(1, &StepError::retryable("down")),
            RetryDecision::Exhausted
        );
    }
}
