//! Per-provider retry execution.
//!
//! Runs one operation with a bounded attempt budget, classifying each
//! failure: non-retryable errors abort immediately, rate limits honor the
//! upstream-supplied wait, and transient errors back off exponentially with
//! uniform jitter. Attempt `n` is given `attempt_timeout * n` to complete,
//! so a slow-starting upstream gets progressively more room.

use crate::error::{ErrorKind, UpstreamError};
use crate::events::{EventListeners, FailoverEvent};
use crate::Operation;
use rand::Rng;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Retry knobs, extracted from the client configuration.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: usize,
    pub(crate) retry_delay: Duration,
    pub(crate) jitter_max: Duration,
    pub(crate) attempt_timeout: Duration,
    pub(crate) rate_limit_default: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying after `attempt` transient failures:
    /// `retry_delay * 2^(attempt-1)` plus uniform jitter.
    fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        let base = self.retry_delay.saturating_mul(1 << exp);
        let jitter_ms = self.jitter_max.as_millis() as u64;
        if jitter_ms == 0 {
            base
        } else {
            base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        }
    }
}

/// Drives one operation against one provider until it succeeds, fails
/// non-retryably, or exhausts the attempt budget. Returns the last error on
/// exhaustion. No side effects beyond sleeping.
pub(crate) async fn run<T>(
    operation: &dyn Operation<T>,
    provider: &str,
    policy: &RetryPolicy,
    listeners: &EventListeners,
) -> Result<T, UpstreamError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_retries {
        listeners.emit(&FailoverEvent::AttemptStarted {
            provider: provider.to_string(),
            attempt,
            timestamp: Instant::now(),
        });
        tracing::debug!(provider, attempt, "starting attempt");

        let deadline = policy.attempt_timeout.saturating_mul(attempt as u32);
        let outcome = match tokio::time::timeout(deadline, operation.call()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::transient(format!(
                "attempt {attempt} timed out after {}ms",
                deadline.as_millis()
            ))),
        };

        let error = match outcome {
            Ok(value) => {
                listeners.emit(&FailoverEvent::ProviderSucceeded {
                    provider: provider.to_string(),
                    attempts: attempt,
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "metrics")]
                counter!("failover_attempts_total", "provider" => provider.to_string(), "outcome" => "success")
                    .increment(1);
                return Ok(value);
            }
            Err(error) => error,
        };

        #[cfg(feature = "metrics")]
        counter!("failover_attempts_total", "provider" => provider.to_string(), "outcome" => "failure")
            .increment(1);

        match error.kind {
            ErrorKind::NonRetryable => {
                tracing::debug!(provider, attempt, error = %error, "non-retryable, aborting provider");
                return Err(error);
            }
            ErrorKind::RateLimited => {
                let wait = error.retry_after.unwrap_or(policy.rate_limit_default);
                if attempt < policy.max_retries {
                    listeners.emit(&FailoverEvent::RateLimitHonored {
                        provider: provider.to_string(),
                        wait,
                        timestamp: Instant::now(),
                    });
                    tracing::warn!(
                        provider,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, honoring upstream wait"
                    );
                    tokio::time::sleep(wait).await;
                }
                last_error = Some(error);
            }
            ErrorKind::Transient | ErrorKind::Unknown => {
                if attempt < policy.max_retries {
                    let delay = policy.backoff(attempt);
                    listeners.emit(&FailoverEvent::RetryScheduled {
                        provider: provider.to_string(),
                        attempt,
                        delay,
                        timestamp: Instant::now(),
                    });
                    tracing::debug!(
                        provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(error);
            }
        }
    }

    let error =
        last_error.unwrap_or_else(|| UpstreamError::unknown("retry budget exhausted"));
    listeners.emit(&FailoverEvent::ProviderFailed {
        provider: provider.to_string(),
        timestamp: Instant::now(),
    });
    tracing::debug!(provider, error = %error, "retry budget exhausted");
    Err(error)
}
