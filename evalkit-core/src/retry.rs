use std::future::Future;
use std::time::Duration;

use crate::{is_retryable, EvalError};

/// Outcome of one pass over a dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub total: usize,
}

impl BatchReport {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Re-runs `batch` until it reports completion or the attempt budget runs out.
///
/// Returns `Ok(false)` when the final attempt finished with rows still
/// incomplete. A non-retryable error ends the loop immediately; a retryable
/// error on the final attempt surfaces as [`EvalError::MaxRetriesExceeded`].
pub async fn run_until_complete<F, Fut>(policy: &RetryPolicy, mut batch: F) -> Result<bool, EvalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BatchReport, EvalError>>,
{
    if policy.max_attempts == 0 {
        tracing::warn!("retry budget is zero, skipping dataset run");
        return Ok(false);
    }

    for attempt in 1..=policy.max_attempts {
        match batch().await {
            Ok(report) if report.is_complete() => {
                tracing::info!(attempt, total = report.total, "all rows complete");
                return Ok(true);
            }
            Ok(report) => {
                tracing::info!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    "{} of {} rows complete",
                    report.completed,
                    report.total
                );
                if attempt == policy.max_attempts {
                    return Ok(false);
                }
            }
            Err(error) => {
                if !is_retryable(&error) {
                    return Err(error);
                }
                tracing::warn!(attempt, error = %error, "dataset run failed");
                if attempt == policy.max_attempts {
                    return Err(EvalError::MaxRetriesExceeded {
                        max: policy.max_attempts,
                        last: Box::new(error),
                    });
                }
            }
        }

        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Ok(false)
}
