//! Retry policy: attempt budget, exponential backoff and jitter

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Errors that may carry an HTTP-like status code
pub trait StatusCoded {
    fn status_code(&self) -> Option<u16>;
}

impl StatusCoded for DomainError {
    fn status_code(&self) -> Option<u16> {
        DomainError::status_code(self)
    }
}

/// Process-wide retry policy for model calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay_ms: u64,
    /// Upper bound on the un-jittered delay
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,
    /// Fraction of the delay used as symmetric random jitter
    pub jitter: f64,
    /// Statuses that are worth retrying
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 32000,
            backoff_multiplier: 2.0,
            jitter: 0.25,
            retryable_status_codes: vec![429, 500, 502, 503, 504, 529],
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    /// Un-jittered delay after the given failed attempt (0-indexed)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64).max(0.0);

        Duration::from_millis(delay_ms as u64)
    }

    /// Delay after the given failed attempt with jitter applied
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay(attempt).as_millis() as f64;
        let jitter = self.jitter.clamp(0.0, 1.0);

        if jitter == 0.0 {
            return Duration::from_millis(base_ms as u64);
        }

        let scale: f64 = rand::thread_rng().gen_range(-jitter..=jitter);
        let jittered = (base_ms + base_ms * scale).max(0.0);

        Duration::from_millis(jittered.round() as u64)
    }

    /// Whether an error should consume another attempt
    pub fn is_retryable<E: StatusCoded>(&self, error: &E) -> bool {
        error
            .status_code()
            .is_some_and(|status| self.retryable_status_codes.contains(&status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 32000);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.jitter, 0.25);
    }

    #[test]
    fn test_base_delay_progression_and_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.base_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(4), Duration::from_millis(16000));
        assert_eq!(policy.base_delay(5), Duration::from_millis(32000));
        assert_eq!(policy.base_delay(9), Duration::from_millis(32000));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let policy = RetryPolicy::default();

        for attempt in 0..8 {
            let base = policy.base_delay(attempt).as_millis() as f64;

            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt).as_millis() as f64;
                assert!(delay >= base * 0.75 - 1.0, "{delay} below {base}");
                assert!(delay <= base * 1.25 + 1.0, "{delay} above {base}");
                assert!(delay <= 32000.0 * 1.25 + 1.0);
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = RetryPolicy::default().with_jitter(0.0);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_retryable_classification() {
        let policy = RetryPolicy::default();

        for status in [429, 500, 502, 503, 504, 529] {
            assert!(policy.is_retryable(&DomainError::upstream("p", status, "x")));
        }

        for status in [400, 401, 403, 404, 422] {
            assert!(!policy.is_retryable(&DomainError::upstream("p", status, "x")));
        }

        assert!(!policy.is_retryable(&DomainError::provider("p", "connection reset")));
    }

    #[test]
    fn test_custom_classifier() {
        let policy = RetryPolicy::default().with_retryable_status_codes(vec![408]);

        assert!(policy.is_retryable(&DomainError::upstream("p", 408, "timeout")));
        assert!(!policy.is_retryable(&DomainError::upstream("p", 503, "down")));
    }
}
