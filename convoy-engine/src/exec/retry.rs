//! Retry controller
//!
//! Pure backoff arithmetic with no side effects, so retry behavior is
//! unit-testable without real time delays. The stage executor owns the
//! actual sleeping.

use std::time::Duration;

use convoy_core::domain::stage::{ErrorClass, RetryPolicy};

/// Decides whether another attempt follows the one that just failed
///
/// `attempt` is the attempt number that failed, starting at 1. Returns
/// `None` when the policy is disabled or attempts are exhausted; otherwise
/// the delay before the next attempt:
/// `min(initial_delay × multiplier^(attempt-1), max_delay)`, which is
/// non-decreasing in the attempt number for multipliers >= 1.
pub fn next_attempt(policy: &RetryPolicy, attempt: u32) -> Option<Duration> {
    if !policy.enabled || attempt >= policy.max_attempts {
        return None;
    }

    let exponent = attempt.saturating_sub(1) as i32;
    let raw = policy.initial_delay_secs as f64 * policy.backoff_multiplier.powi(exponent);
    let capped = raw.min(policy.max_delay_secs as f64).max(0.0);
    Some(Duration::from_secs_f64(capped))
}

/// True when the policy considers this failure class worth retrying
///
/// An enabled policy with no listed classes retries everything.
pub fn class_retryable(policy: &RetryPolicy, class: ErrorClass) -> bool {
    policy.retry_on.is_empty()
        || policy.retry_on.contains(&ErrorClass::Any)
        || policy.retry_on.contains(&class)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, initial: u64, multiplier: f64, max_delay: u64) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            max_attempts,
            initial_delay_secs: initial,
            backoff_multiplier: multiplier,
            max_delay_secs: max_delay,
            retry_on: Vec::new(),
        }
    }

    #[test]
    fn test_disabled_policy_never_retries() {
        let mut p = policy(3, 5, 2.0, 300);
        p.enabled = false;
        assert!(next_attempt(&p, 1).is_none());
    }

    #[test]
    fn test_exhaustion() {
        let p = policy(3, 5, 2.0, 300);
        assert!(next_attempt(&p, 1).is_some());
        assert!(next_attempt(&p, 2).is_some());
        assert!(next_attempt(&p, 3).is_none());
        assert!(next_attempt(&p, 17).is_none());
    }

    #[test]
    fn test_exponential_delays() {
        let p = policy(5, 2, 3.0, 1000);
        assert_eq!(next_attempt(&p, 1), Some(Duration::from_secs(2)));
        assert_eq!(next_attempt(&p, 2), Some(Duration::from_secs(6)));
        assert_eq!(next_attempt(&p, 3), Some(Duration::from_secs(18)));
        assert_eq!(next_attempt(&p, 4), Some(Duration::from_secs(54)));
    }

    #[test]
    fn test_delay_clamped_to_max() {
        let p = policy(10, 60, 10.0, 120);
        assert_eq!(next_attempt(&p, 1), Some(Duration::from_secs(60)));
        assert_eq!(next_attempt(&p, 2), Some(Duration::from_secs(120)));
        assert_eq!(next_attempt(&p, 5), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_delays_non_decreasing() {
        let p = policy(8, 3, 1.7, 90);
        let mut previous = Duration::ZERO;
        for attempt in 1..p.max_attempts {
            let delay = next_attempt(&p, attempt).unwrap();
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn test_class_gating() {
        let mut p = policy(3, 5, 2.0, 300);
        assert!(class_retryable(&p, ErrorClass::Transient));

        p.retry_on = vec![ErrorClass::Timeout];
        assert!(class_retryable(&p, ErrorClass::Timeout));
        assert!(!class_retryable(&p, ErrorClass::Transient));

        p.retry_on = vec![ErrorClass::Any];
        assert!(class_retryable(&p, ErrorClass::Infrastructure));
    }
}
