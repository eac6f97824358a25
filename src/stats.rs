//! Process-wide call counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for the lifetime of one client, reset only via
/// [`FailoverClient::reset_stats`](crate::FailoverClient::reset_stats).
#[derive(Debug, Default)]
pub(crate) struct FailoverStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    fallback_used: AtomicU64,
    cache_hits: AtomicU64,
    circuit_breaker_trips: AtomicU64,
}

/// Point-in-time view of the client's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub fallback_used: u64,
    pub cache_hits: u64,
    pub circuit_breaker_trips: u64,
}

impl FailoverStats {
    pub(crate) fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallback_used.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_breaker_trip(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.fallback_used.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.circuit_breaker_trips.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let stats = FailoverStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_success();
        stats.record_fallback();
        stats.record_cache_hit();
        stats.record_breaker_trip();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.fallback_used, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.circuit_breaker_trips, 1);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
