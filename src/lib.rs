//! Resilient multi-provider client for rate-limited, unreliable upstream APIs.
//!
//! This crate layers an orchestration policy over an arbitrary asynchronous
//! operation: a caller-supplied function that performs one upstream call and
//! either returns a value or fails with a classifiable [`UpstreamError`].
//! One call through [`FailoverClient::call_with_fallback`] composes:
//!
//! - **Cache-aside lookup**: a primary cache tier is checked before any
//!   provider is contacted, and written through after every success.
//! - **Provider chain**: named providers are tried in ascending priority
//!   order, each guarded by its own circuit breaker.
//! - **Global admission**: a single FIFO queue bounds how many operations
//!   run concurrently across all providers combined.
//! - **Retry with backoff**: transient failures back off exponentially with
//!   jitter, rate limits honor the upstream-supplied wait, and
//!   authorization/not-found errors abort the provider immediately.
//! - **Emergency degradation**: when every provider is down, the last known
//!   good value is served from a long-lived emergency cache tier.
//!
//! The caller always receives a complete [`CallResult`] envelope, never a
//! raw error: `from_cache=true` with success distinguishes "degraded but
//! served stale" from a hard outage (`is_success() == false`).
//!
//! # Example
//!
//! ```
//! use provider_failover::{FailoverClient, FailoverConfig, ProviderSpec, UpstreamError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FailoverConfig::builder()
//!     .name("scores-api")
//!     .provider(ProviderSpec::new("primary", 1))
//!     .provider(ProviderSpec::new("eu-mirror", 2).regions(["eu-west"]))
//!     .max_retries(3)
//!     .build()?;
//!
//! let client: FailoverClient<String> = FailoverClient::new(config);
//!
//! let result = client
//!     .call_with_fallback("fetch_scores", &["2026"], || async {
//!         // One real upstream call; failures carry an HTTP-like status.
//!         Ok::<_, UpstreamError>("payload".to_string())
//!     })
//!     .await;
//!
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Known limitations
//!
//! There is no caller-triggered cancellation: an in-flight backoff sleep or
//! queued task always runs to completion. The admission queue has no bound
//! on pending waiters, so sustained overload grows memory without
//! backpressure. Both behaviors are deliberate and preserved from the
//! system this crate was built for.

mod cache;
mod chain;
mod config;
mod error;
mod events;
mod provider;
mod queue;
mod retry;
mod stats;

pub use cache::{cache_key, CacheBackend, InMemoryCache};
pub use config::{ConfigError, FailoverConfig, FailoverConfigBuilder, ProviderSpec};
pub use error::{CacheError, ErrorKind, FailoverError, UpstreamError};
pub use events::{BoxedListener, EventListeners, FailoverEvent};
pub use provider::Provider;
pub use stats::StatsSnapshot;

use cache::TieredCache;
use futures::future::BoxFuture;
use provider::ProviderRegistry;
use queue::RequestQueue;
use retry::RetryPolicy;
use stats::FailoverStats;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::counter;

/// One upstream call, supplied by the caller.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<T, UpstreamError>>`
/// closure, so call sites normally just pass an async closure. The operation
/// may be invoked several times per logical call (retries, further
/// providers); it must be safe to re-run.
pub trait Operation<T>: Send + Sync {
    /// Performs one upstream call.
    fn call(&self) -> BoxFuture<'static, Result<T, UpstreamError>>;
}

impl<T, F, Fut> Operation<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'static, Result<T, UpstreamError>> {
        Box::pin(self())
    }
}

/// The envelope returned by every call. Immutable once returned.
#[derive(Debug)]
pub struct CallResult<T> {
    /// The value, or the last error after total exhaustion.
    pub result: Result<T, FailoverError>,
    /// Which source served the call: a provider name, `"cache"`, or
    /// `"emergency-cache"`. `None` on failure or direct (fallback-disabled)
    /// calls.
    pub provider: Option<String>,
    /// True when the value came from either cache tier.
    pub from_cache: bool,
    /// Providers actually attempted, in chain order. Providers skipped by an
    /// open breaker are not listed.
    pub retried_providers: Vec<String>,
    /// Wall-clock time spent inside `call_with_fallback`.
    pub elapsed: Duration,
}

impl<T> CallResult<T> {
    /// True when the call produced a value (fresh or cached).
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The value, if the call succeeded.
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// The terminal error, if the call failed.
    pub fn error(&self) -> Option<&FailoverError> {
        self.result.as_ref().err()
    }

    /// Execution time in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

struct Inner<T> {
    config: FailoverConfig,
    registry: ProviderRegistry,
    queue: RequestQueue,
    cache: TieredCache<T>,
    policy: RetryPolicy,
    stats: FailoverStats,
}

/// The failover orchestrator.
///
/// Explicitly constructed and cheap to clone; every clone shares the same
/// breaker state, admission queue, cache, and statistics. Independent
/// instances are fully isolated, which keeps tests and multi-tenant setups
/// free of hidden global state.
pub struct FailoverClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FailoverClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FailoverClient<T> {
    /// Creates a client backed by an [`InMemoryCache`].
    pub fn new(config: FailoverConfig) -> Self {
        Self::with_cache(config, Arc::new(InMemoryCache::new()))
    }

    /// Creates a client over a shared external cache backend.
    pub fn with_cache(config: FailoverConfig, backend: Arc<dyn CacheBackend<T>>) -> Self {
        let registry = ProviderRegistry::new(config.providers.clone());
        let queue = RequestQueue::new(config.max_concurrent, config.name.clone());
        let cache = TieredCache::new(backend, config.cache_ttl);
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            jitter_max: config.jitter_max,
            attempt_timeout: config.attempt_timeout,
            rate_limit_default: config.rate_limit_default,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                queue,
                cache,
                policy,
                stats: FailoverStats::default(),
            }),
        }
    }

    /// Executes one logical call through the full resilience stack.
    ///
    /// `name` identifies the operation for cache keying and logging; `args`
    /// are folded into the cache key in order (the operation itself captures
    /// whatever it needs).
    pub async fn call_with_fallback<O>(&self, name: &str, args: &[&str], operation: O) -> CallResult<T>
    where
        O: Operation<T>,
    {
        let inner = &*self.inner;
        let started = Instant::now();
        inner.stats.record_request();

        #[cfg(feature = "metrics")]
        counter!("failover_calls_total", "client" => inner.config.name.clone()).increment(1);

        if !inner.config.enable_fallback {
            // Raw passthrough: no cache, no chain, no retry.
            let result = operation.call().await;
            if result.is_ok() {
                inner.stats.record_success();
            }
            return CallResult {
                result: result.map_err(FailoverError::from),
                provider: None,
                from_cache: false,
                retried_providers: Vec::new(),
                elapsed: started.elapsed(),
            };
        }

        let key = cache_key(name, args);

        if let Some(value) = inner.cache.get_fresh(&key).await {
            inner.stats.record_cache_hit();
            inner.stats.record_success();
            inner.config.event_listeners.emit(&FailoverEvent::CacheHit {
                key: key.clone(),
                timestamp: Instant::now(),
            });
            tracing::debug!(operation = name, key = %key, "served from primary cache");
            #[cfg(feature = "metrics")]
            counter!("failover_cache_hits_total", "client" => inner.config.name.clone())
                .increment(1);
            return CallResult {
                result: Ok(value),
                provider: Some("cache".to_string()),
                from_cache: true,
                retried_providers: Vec::new(),
                elapsed: started.elapsed(),
            };
        }

        let outcome = chain::execute(
            &operation,
            &inner.registry,
            &inner.config,
            &inner.policy,
            &inner.queue,
            &inner.stats,
        )
        .await;

        match outcome.result {
            Ok((value, winner, priority)) => {
                inner
                    .cache
                    .put(&key, value.clone(), inner.config.cache_on_failure)
                    .await;
                if inner.registry.primary_priority().is_some_and(|p| priority != p) {
                    inner.stats.record_fallback();
                    tracing::info!(
                        operation = name,
                        provider = %winner,
                        "served by fallback provider"
                    );
                }
                inner.stats.record_success();
                CallResult {
                    result: Ok(value),
                    provider: Some(winner),
                    from_cache: false,
                    retried_providers: outcome.retried_providers,
                    elapsed: started.elapsed(),
                }
            }
            Err(error) => {
                if inner.config.cache_on_failure {
                    if let Some(value) = inner.cache.get_stale(&key).await {
                        inner.stats.record_success();
                        inner.config.event_listeners.emit(&FailoverEvent::ServedStale {
                            key: key.clone(),
                            timestamp: Instant::now(),
                        });
                        tracing::warn!(
                            operation = name,
                            key = %key,
                            "all providers down, serving last known good value"
                        );
                        #[cfg(feature = "metrics")]
                        counter!("failover_stale_serves_total", "client" => inner.config.name.clone())
                            .increment(1);
                        return CallResult {
                            result: Ok(value),
                            provider: Some("emergency-cache".to_string()),
                            from_cache: true,
                            retried_providers: outcome.retried_providers,
                            elapsed: started.elapsed(),
                        };
                    }
                }
                tracing::error!(
                    operation = name,
                    error = %error,
                    retried = ?outcome.retried_providers,
                    "hard outage: all providers failed and no emergency entry"
                );
                CallResult {
                    result: Err(error),
                    provider: None,
                    from_cache: false,
                    retried_providers: outcome.retried_providers,
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Snapshot of every configured provider, in chain order.
    pub fn providers(&self) -> Vec<Provider> {
        self.inner.registry.snapshot()
    }

    /// Admin: clears one provider's breaker and failure tally. Returns false
    /// for an unknown name.
    pub fn reset_provider(&self, name: &str) -> bool {
        self.inner.registry.reset(name)
    }

    /// Admin: stops routing to a provider. The provider is kept, not
    /// deleted, and can be re-admitted with [`activate_provider`](Self::activate_provider).
    pub fn deactivate_provider(&self, name: &str) -> bool {
        self.inner.registry.deactivate(name)
    }

    /// Admin: re-admits a deactivated provider.
    pub fn activate_provider(&self, name: &str) -> bool {
        self.inner.registry.activate(name)
    }

    /// Snapshot of the aggregate call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Admin: zeroes the aggregate call counters.
    pub fn reset_stats(&self) {
        self.inner.stats.reset()
    }

    /// Number of operations currently executing through the admission queue.
    pub fn in_flight(&self) -> usize {
        self.inner.queue.in_flight()
    }

    /// The configured client name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }
}
