//! Configuration for the failover client.

use crate::events::{EventListeners, FailoverEvent};
use std::time::Duration;

/// Static description of one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Unique provider name, reported in [`CallResult`](crate::CallResult).
    pub name: String,
    /// Lower priority is tried first.
    pub priority: u32,
    /// Regions this provider serves. Informational; not used for routing.
    pub regions: Vec<String>,
}

impl ProviderSpec {
    /// Creates a provider spec with no region annotations.
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            regions: Vec::new(),
        }
    }

    /// Sets the regions this provider serves.
    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }
}

/// Configuration for [`FailoverClient`](crate::FailoverClient).
pub struct FailoverConfig {
    pub(crate) name: String,
    pub(crate) providers: Vec<ProviderSpec>,
    pub(crate) enable_fallback: bool,
    pub(crate) max_retries: usize,
    pub(crate) retry_delay: Duration,
    pub(crate) jitter_max: Duration,
    pub(crate) attempt_timeout: Duration,
    pub(crate) circuit_breaker_threshold: u32,
    pub(crate) circuit_breaker_reset: Duration,
    pub(crate) max_concurrent: usize,
    pub(crate) rate_limit_default: Duration,
    pub(crate) cache_on_failure: bool,
    pub(crate) cache_ttl: Duration,
    pub(crate) count_rate_limited: bool,
    pub(crate) event_listeners: EventListeners,
}

impl FailoverConfig {
    /// Creates a new builder with defaults.
    pub fn builder() -> FailoverConfigBuilder {
        FailoverConfigBuilder::new()
    }
}

/// Error returned when a [`FailoverConfigBuilder`] is misconfigured.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one provider is required")]
    NoProviders,
    #[error("duplicate provider name: {0}")]
    DuplicateProvider(String),
    #[error("max_retries must be at least 1")]
    ZeroRetries,
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("circuit_breaker_threshold must be at least 1")]
    ZeroThreshold,
}

/// Builder for [`FailoverConfig`].
pub struct FailoverConfigBuilder {
    name: String,
    providers: Vec<ProviderSpec>,
    enable_fallback: bool,
    max_retries: usize,
    retry_delay: Duration,
    jitter_max: Duration,
    attempt_timeout: Duration,
    circuit_breaker_threshold: u32,
    circuit_breaker_reset: Duration,
    max_concurrent: usize,
    rate_limit_default: Duration,
    cache_on_failure: bool,
    cache_ttl: Duration,
    count_rate_limited: bool,
    event_listeners: EventListeners,
}

impl Default for FailoverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FailoverConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_retries: 3 attempts per provider
    /// - retry_delay: 1s (base for exponential backoff)
    /// - jitter_max: 1s
    /// - attempt_timeout: 10s (scaled by attempt number)
    /// - circuit_breaker_threshold: 5 failures
    /// - circuit_breaker_reset: 300s
    /// - max_concurrent: 5 (global, across all providers)
    /// - rate_limit_default: 60s (when the upstream omits retry-after)
    /// - cache_ttl: 3600s for the primary tier
    /// - cache_on_failure: true (emergency tier enabled)
    /// - count_rate_limited: false (429 exhaustion is not a breaker failure)
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            providers: Vec::new(),
            enable_fallback: true,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            jitter_max: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset: Duration::from_secs(300),
            max_concurrent: 5,
            rate_limit_default: Duration::from_secs(60),
            cache_on_failure: true,
            cache_ttl: Duration::from_secs(3600),
            count_rate_limited: false,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the client name (used in logs and metrics labels).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a provider to the fallback chain.
    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        self.providers.push(spec);
        self
    }

    /// Adds several providers at once.
    pub fn providers<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = ProviderSpec>,
    {
        self.providers.extend(specs);
        self
    }

    /// Disables the whole resilience layer: operations are invoked directly,
    /// with no cache, chain, retry, or breaker involvement.
    pub fn disable_fallback(mut self) -> Self {
        self.enable_fallback = false;
        self
    }

    /// Sets the number of attempts per provider (including the first).
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay for exponential backoff and inter-provider waits.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the upper bound of the uniform jitter added to each backoff.
    pub fn jitter_max(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    /// Sets the base per-attempt deadline. Attempt `n` is allowed
    /// `attempt_timeout * n` to tolerate a slow-starting upstream.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets how many recorded failures open a provider's circuit breaker.
    pub fn circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    /// Sets how long an open breaker blocks a provider before a trial call.
    pub fn circuit_breaker_reset(mut self, reset: Duration) -> Self {
        self.circuit_breaker_reset = reset;
        self
    }

    /// Sets the global in-flight operation bound, across all providers.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the wait applied to a 429 that carried no retry-after hint.
    pub fn rate_limit_default(mut self, wait: Duration) -> Self {
        self.rate_limit_default = wait;
        self
    }

    /// Disables the emergency cache tier (no stale-data degradation).
    pub fn disable_cache_on_failure(mut self) -> Self {
        self.cache_on_failure = false;
        self
    }

    /// Sets the primary cache tier TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Counts rate-limit exhaustion toward the provider's breaker tally.
    ///
    /// Off by default so that throttling alone cannot trip a breaker.
    pub fn count_rate_limited(mut self, count: bool) -> Self {
        self.count_rate_limited = count;
        self
    }

    /// Registers a listener for every [`FailoverEvent`].
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&FailoverEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(f);
        self
    }

    /// Registers a callback for circuit breaker trips.
    ///
    /// Called with the provider name and its failure count at the moment the
    /// breaker opened.
    pub fn on_breaker_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event| {
            if let FailoverEvent::BreakerOpened {
                provider,
                failure_count,
                ..
            } = event
            {
                f(provider, *failure_count);
            }
        });
        self
    }

    /// Registers a callback invoked before each backoff sleep, with the
    /// provider name, attempt number, and delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event| {
            if let FailoverEvent::RetryScheduled {
                provider,
                attempt,
                delay,
                ..
            } = event
            {
                f(provider, *attempt, *delay);
            }
        });
        self
    }

    /// Registers a callback invoked when a call is served from the emergency
    /// cache after total provider exhaustion.
    pub fn on_stale_serve<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event| {
            if let FailoverEvent::ServedStale { key, .. } = event {
                f(key);
            }
        });
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<FailoverConfig, ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        for (i, p) in self.providers.iter().enumerate() {
            if self.providers[..i].iter().any(|q| q.name == p.name) {
                return Err(ConfigError::DuplicateProvider(p.name.clone()));
            }
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }

        Ok(FailoverConfig {
            name: self.name,
            providers: self.providers,
            enable_fallback: self.enable_fallback,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            jitter_max: self.jitter_max,
            attempt_timeout: self.attempt_timeout,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            circuit_breaker_reset: self.circuit_breaker_reset,
            max_concurrent: self.max_concurrent,
            rate_limit_default: self.rate_limit_default,
            cache_on_failure: self.cache_on_failure,
            cache_ttl: self.cache_ttl,
            count_rate_limited: self.count_rate_limited,
            event_listeners: self.event_listeners,
        })
    }
}
