//! Retry executor - runs fallible async operations under a retry policy

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, warn};

use super::policy::{RetryPolicy, StatusCoded};

/// Kind of model call being retried. Used as the metric label, so the set
/// stays fixed; per-step detail belongs in tracing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLabel {
    Plan,
    Step,
    Final,
    Conversation,
}

impl RetryLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Step => "step",
            Self::Final => "final",
            Self::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for RetryLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wraps async operations with bounded retries and jittered exponential backoff.
///
/// Only errors classified as retryable by the policy consume another attempt;
/// anything else is returned immediately. When the attempt budget runs out the
/// last error is returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: Arc<RetryPolicy>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it succeeds, fails fatally, or the attempt
    /// budget is spent. `label` identifies the call in logs and metrics.
    pub async fn execute<T, E, Op, Fut>(&self, label: RetryLabel, mut operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCoded + Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            debug!(
                label = %label,
                attempt = attempt + 1,
                max_attempts = max_attempts,
                "Attempting operation"
            );

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            label = %label,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !self.policy.is_retryable(&error) {
                warn!(
                    label = %label,
                    attempt = attempt + 1,
                    status = ?error.status_code(),
                    error = %error,
                    "Operation failed with non-retryable error"
                );
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                error!(
                    label = %label,
                    attempts = max_attempts,
                    status = ?error.status_code(),
                    error = %error,
                    "Retries exhausted"
                );
                counter!("llm_retries_exhausted_total", "label" => label.as_str()).increment(1);
                return Err(error);
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(
                label = %label,
                attempt = attempt + 1,
                status = ?error.status_code(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, backing off"
            );
            counter!("llm_retries_total", "label" => label.as_str()).increment(1);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
