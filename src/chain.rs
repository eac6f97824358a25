//! Ordered provider chain execution.
//!
//! Walks the active providers in ascending priority, skipping any with an
//! open circuit breaker, and runs the operation through the global request
//! queue and the retry executor for each candidate in turn. The first
//! success wins; failures are recorded against the provider's breaker and
//! the chain advances after a priority-scaled delay.

use crate::config::FailoverConfig;
use crate::error::{ErrorKind, FailoverError};
use crate::events::FailoverEvent;
use crate::provider::{Availability, ProviderRegistry};
use crate::queue::RequestQueue;
use crate::retry::{self, RetryPolicy};
use crate::stats::FailoverStats;
use crate::Operation;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// What the chain produced: a value plus the winning provider's name and
/// priority, or the terminal error after exhaustion. `retried_providers`
/// lists every provider actually attempted, in order; skipped providers are
/// absent.
pub(crate) struct ChainOutcome<T> {
    pub(crate) result: Result<(T, String, u32), FailoverError>,
    pub(crate) retried_providers: Vec<String>,
}

pub(crate) async fn execute<T>(
    operation: &dyn Operation<T>,
    registry: &ProviderRegistry,
    config: &FailoverConfig,
    policy: &RetryPolicy,
    queue: &RequestQueue,
    stats: &FailoverStats,
) -> ChainOutcome<T> {
    let listeners = &config.event_listeners;
    let providers = registry.ordered();
    let mut retried_providers = Vec::new();
    let mut last_error = None;

    for (index, provider) in providers.iter().enumerate() {
        let name = provider.spec.name.as_str();

        match provider.check(config.circuit_breaker_reset) {
            Availability::Inactive => continue,
            Availability::CircuitOpen => {
                listeners.emit(&FailoverEvent::ProviderSkipped {
                    provider: name.to_string(),
                    timestamp: Instant::now(),
                });
                tracing::debug!(provider = name, "circuit open, skipping provider");
                #[cfg(feature = "metrics")]
                counter!("failover_providers_skipped_total", "provider" => name.to_string())
                    .increment(1);
                continue;
            }
            Availability::Ready { reclosed } => {
                if reclosed {
                    listeners.emit(&FailoverEvent::BreakerReset {
                        provider: name.to_string(),
                        timestamp: Instant::now(),
                    });
                    tracing::info!(provider = name, "circuit cooldown elapsed, allowing trial call");
                }
            }
        }

        retried_providers.push(name.to_string());

        let attempt = queue
            .enqueue(listeners, retry::run(operation, name, policy, listeners))
            .await;

        match attempt {
            Ok(value) => {
                provider.record_success();
                return ChainOutcome {
                    result: Ok((value, name.to_string(), provider.spec.priority)),
                    retried_providers,
                };
            }
            Err(error) => {
                let breaker_failure =
                    error.kind != ErrorKind::RateLimited || config.count_rate_limited;
                if breaker_failure {
                    if let Some(failures) =
                        provider.record_failure(config.circuit_breaker_threshold)
                    {
                        stats.record_breaker_trip();
                        listeners.emit(&FailoverEvent::BreakerOpened {
                            provider: name.to_string(),
                            failure_count: failures,
                            timestamp: Instant::now(),
                        });
                        tracing::warn!(
                            provider = name,
                            failures,
                            "failure threshold reached, circuit opened"
                        );
                        #[cfg(feature = "metrics")]
                        counter!("failover_breaker_trips_total", "provider" => name.to_string())
                            .increment(1);
                    }
                }
                tracing::warn!(provider = name, error = %error, "provider exhausted, advancing chain");
                last_error = Some(error);

                // Pause before the next candidate only when one is actually
                // eligible; an all-skipped remainder returns immediately.
                let more_eligible = providers[index + 1..]
                    .iter()
                    .any(|p| p.peek(config.circuit_breaker_reset));
                if more_eligible {
                    let exp = provider.spec.priority.saturating_sub(1).min(16);
                    let delay = config.retry_delay.saturating_mul(1 << exp);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let error = match last_error {
        Some(error) => FailoverError::Upstream(error),
        // Every provider was skipped by an open breaker (or deactivated).
        None => FailoverError::NoEligibleProvider,
    };
    listeners.emit(&FailoverEvent::Exhausted {
        retried_providers: retried_providers.clone(),
        timestamp: Instant::now(),
    });
    ChainOutcome {
        result: Err(error),
        retried_providers,
    }
}
