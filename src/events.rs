//! Event system for failover observability.
//!
//! Listeners registered through the config builder receive every event; a
//! panicking listener does not prevent the others from being called.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events emitted while executing a call through the failover client.
#[derive(Debug, Clone)]
pub enum FailoverEvent {
    /// The primary cache served the call.
    CacheHit { key: String, timestamp: Instant },
    /// A provider was skipped because its circuit breaker is open.
    ProviderSkipped { provider: String, timestamp: Instant },
    /// An attempt against a provider is about to start.
    AttemptStarted {
        provider: String,
        attempt: usize,
        timestamp: Instant,
    },
    /// A retry was scheduled after a transient failure.
    RetryScheduled {
        provider: String,
        attempt: usize,
        delay: Duration,
        timestamp: Instant,
    },
    /// An upstream-requested rate-limit wait is being honored.
    RateLimitHonored {
        provider: String,
        wait: Duration,
        timestamp: Instant,
    },
    /// A provider's circuit breaker transitioned from closed to open.
    BreakerOpened {
        provider: String,
        failure_count: u32,
        timestamp: Instant,
    },
    /// A provider's circuit breaker closed again after its cooldown.
    BreakerReset { provider: String, timestamp: Instant },
    /// A provider exhausted its retry budget for one call.
    ProviderFailed { provider: String, timestamp: Instant },
    /// A provider completed the call.
    ProviderSucceeded {
        provider: String,
        attempts: usize,
        timestamp: Instant,
    },
    /// A task was dispatched by the request queue after waiting for a slot.
    TaskDispatched { queued_for: Duration, timestamp: Instant },
    /// Every provider failed; the emergency cache served stale data.
    ServedStale { key: String, timestamp: Instant },
    /// Every provider failed and no emergency entry existed.
    Exhausted {
        retried_providers: Vec<String>,
        timestamp: Instant,
    },
}

impl FailoverEvent {
    /// Short name of the event variant, for logging and metrics labels.
    pub fn event_type(&self) -> &'static str {
        match self {
            FailoverEvent::CacheHit { .. } => "CacheHit",
            FailoverEvent::ProviderSkipped { .. } => "ProviderSkipped",
            FailoverEvent::AttemptStarted { .. } => "AttemptStarted",
            FailoverEvent::RetryScheduled { .. } => "RetryScheduled",
            FailoverEvent::RateLimitHonored { .. } => "RateLimitHonored",
            FailoverEvent::BreakerOpened { .. } => "BreakerOpened",
            FailoverEvent::BreakerReset { .. } => "BreakerReset",
            FailoverEvent::ProviderFailed { .. } => "ProviderFailed",
            FailoverEvent::ProviderSucceeded { .. } => "ProviderSucceeded",
            FailoverEvent::TaskDispatched { .. } => "TaskDispatched",
            FailoverEvent::ServedStale { .. } => "ServedStale",
            FailoverEvent::Exhausted { .. } => "Exhausted",
        }
    }
}

/// Type alias for boxed event listeners.
pub type BoxedListener = Arc<dyn Fn(&FailoverEvent) + Send + Sync>;

/// A collection of event listeners.
#[derive(Clone, Default)]
pub struct EventListeners {
    listeners: Vec<BoxedListener>,
}

impl EventListeners {
    /// Creates an empty listener collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn add<F>(&mut self, listener: F)
    where
        F: Fn(&FailoverEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// If a listener panics, the panic is caught and the remaining listeners
    /// are still called.
    pub fn emit(&self, event: &FailoverEvent) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event);
            }));
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}
