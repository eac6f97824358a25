//! Provider registry and per-provider circuit breakers.
//!
//! Each provider carries a failure tally and an open/closed breaker flag,
//! shared by every concurrent call targeting it. The breaker has no
//! background timer: the open state is re-evaluated lazily on every
//! availability check, and the invariant is
//! `open == (failure_count >= threshold && now < last_failure + reset)`.

use crate::config::ProviderSpec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Point-in-time snapshot of one provider's state, for the admin surface.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub priority: u32,
    pub regions: Vec<String>,
    pub is_active: bool,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub circuit_open: bool,
}

#[derive(Debug, Default)]
struct Breaker {
    failure_count: u32,
    last_failure: Option<Instant>,
    open: bool,
}

/// Outcome of an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Availability {
    /// The provider may be attempted. `reclosed` is true when this check
    /// performed the lazy open-to-closed transition (a trial call).
    Ready { reclosed: bool },
    /// The breaker is open; skip without counting an attempt.
    CircuitOpen,
    /// The provider was deactivated by an admin operation.
    Inactive,
}

pub(crate) struct ProviderState {
    pub(crate) spec: ProviderSpec,
    active: AtomicBool,
    breaker: Mutex<Breaker>,
}

fn lock(breaker: &Mutex<Breaker>) -> MutexGuard<'_, Breaker> {
    // A panic while holding the lock leaves valid counter state behind.
    match breaker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ProviderState {
    fn new(spec: ProviderSpec) -> Self {
        Self {
            spec,
            active: AtomicBool::new(true),
            breaker: Mutex::new(Breaker::default()),
        }
    }

    /// Evaluates the breaker, performing the lazy reset when the cooldown
    /// has elapsed.
    pub(crate) fn check(&self, reset_timeout: Duration) -> Availability {
        if !self.active.load(Ordering::Acquire) {
            return Availability::Inactive;
        }
        let mut breaker = lock(&self.breaker);
        if !breaker.open {
            return Availability::Ready { reclosed: false };
        }
        let elapsed_cooldown = breaker
            .last_failure
            .is_none_or(|at| at.elapsed() >= reset_timeout);
        if elapsed_cooldown {
            breaker.open = false;
            breaker.failure_count = 0;
            Availability::Ready { reclosed: true }
        } else {
            Availability::CircuitOpen
        }
    }

    /// Non-mutating eligibility check: true when [`check`](Self::check)
    /// would currently admit this provider. Performs no lazy transition, so
    /// it is safe to use for look-ahead.
    pub(crate) fn peek(&self, reset_timeout: Duration) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let breaker = lock(&self.breaker);
        !breaker.open
            || breaker
                .last_failure
                .is_none_or(|at| at.elapsed() >= reset_timeout)
    }

    /// Records a failed call. When this failure crossed the threshold and
    /// opened the breaker, returns the tally observed at the crossing; the
    /// crossing is detected under the lock so concurrent callers cannot both
    /// report the trip, and the returned count cannot include later failures.
    pub(crate) fn record_failure(&self, threshold: u32) -> Option<u32> {
        let mut breaker = lock(&self.breaker);
        breaker.failure_count += 1;
        breaker.last_failure = Some(Instant::now());
        if breaker.failure_count >= threshold && !breaker.open {
            breaker.open = true;
            Some(breaker.failure_count)
        } else {
            None
        }
    }

    /// Records a successful call: the tally resets and the breaker closes.
    pub(crate) fn record_success(&self) {
        let mut breaker = lock(&self.breaker);
        breaker.failure_count = 0;
        breaker.open = false;
    }

    #[cfg(test)]
    pub(crate) fn failure_count(&self) -> u32 {
        lock(&self.breaker).failure_count
    }

    fn snapshot(&self) -> Provider {
        let breaker = lock(&self.breaker);
        Provider {
            name: self.spec.name.clone(),
            priority: self.spec.priority,
            regions: self.spec.regions.clone(),
            is_active: self.active.load(Ordering::Acquire),
            failure_count: breaker.failure_count,
            last_failure: breaker.last_failure,
            circuit_open: breaker.open,
        }
    }
}

/// All configured providers, ordered by ascending priority.
///
/// Providers are created once at construction and never removed, only
/// deactivated.
pub(crate) struct ProviderRegistry {
    providers: Vec<Arc<ProviderState>>,
}

impl ProviderRegistry {
    pub(crate) fn new(mut specs: Vec<ProviderSpec>) -> Self {
        specs.sort_by_key(|spec| spec.priority);
        Self {
            providers: specs
                .into_iter()
                .map(|spec| Arc::new(ProviderState::new(spec)))
                .collect(),
        }
    }

    /// Providers in chain order (ascending priority).
    pub(crate) fn ordered(&self) -> &[Arc<ProviderState>] {
        &self.providers
    }

    /// The lowest configured priority; a call won by any other provider
    /// counts as fallback.
    pub(crate) fn primary_priority(&self) -> Option<u32> {
        self.providers.first().map(|p| p.spec.priority)
    }

    fn find(&self, name: &str) -> Option<&Arc<ProviderState>> {
        self.providers.iter().find(|p| p.spec.name == name)
    }

    /// Admin: clears the breaker and tally for one provider.
    pub(crate) fn reset(&self, name: &str) -> bool {
        match self.find(name) {
            Some(provider) => {
                provider.record_success();
                true
            }
            None => false,
        }
    }

    /// Admin: stops routing to a provider without forgetting it.
    pub(crate) fn deactivate(&self, name: &str) -> bool {
        match self.find(name) {
            Some(provider) => {
                provider.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Admin: re-admits a deactivated provider.
    pub(crate) fn activate(&self, name: &str) -> bool {
        match self.find(name) {
            Some(provider) => {
                provider.active.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(names: &[(&str, u32)]) -> ProviderRegistry {
        ProviderRegistry::new(
            names
                .iter()
                .map(|(name, priority)| ProviderSpec::new(*name, *priority))
                .collect(),
        )
    }

    #[test]
    fn ordered_by_priority_regardless_of_insertion() {
        let registry = registry(&[("backup", 3), ("primary", 1), ("mirror", 2)]);
        let order: Vec<_> = registry
            .ordered()
            .iter()
            .map(|p| p.spec.name.as_str())
            .collect();
        assert_eq!(order, vec!["primary", "mirror", "backup"]);
        assert_eq!(registry.primary_priority(), Some(1));
    }

    #[test]
    fn threshold_boundary_opens_on_exactly_the_fifth_failure() {
        let registry = registry(&[("p", 1)]);
        let provider = &registry.ordered()[0];

        for _ in 0..4 {
            assert_eq!(provider.record_failure(5), None);
        }
        assert_eq!(
            provider.check(Duration::from_secs(300)),
            Availability::Ready { reclosed: false }
        );

        // Fifth failure trips, and only that call reports the trip, with the
        // tally it observed at the crossing.
        assert_eq!(provider.record_failure(5), Some(5));
        assert_eq!(
            provider.check(Duration::from_secs(300)),
            Availability::CircuitOpen
        );

        // Further failures while open do not re-report.
        assert_eq!(provider.record_failure(5), None);
    }

    #[test]
    fn lazy_reset_after_cooldown() {
        let registry = registry(&[("p", 1)]);
        let provider = &registry.ordered()[0];
        for _ in 0..5 {
            let _ = provider.record_failure(5);
        }
        assert_eq!(
            provider.check(Duration::from_millis(40)),
            Availability::CircuitOpen
        );
        assert!(!provider.peek(Duration::from_millis(40)));

        std::thread::sleep(Duration::from_millis(50));
        // The look-ahead sees eligibility without performing the transition.
        assert!(provider.peek(Duration::from_millis(40)));
        assert_eq!(
            provider.check(Duration::from_millis(40)),
            Availability::Ready { reclosed: true }
        );
        // The transition reset the tally.
        assert_eq!(provider.failure_count(), 0);
        assert_eq!(
            provider.check(Duration::from_millis(40)),
            Availability::Ready { reclosed: false }
        );
    }

    #[test]
    fn success_clears_tally_and_closes() {
        let registry = registry(&[("p", 1)]);
        let provider = &registry.ordered()[0];
        for _ in 0..5 {
            let _ = provider.record_failure(5);
        }
        provider.record_success();
        assert_eq!(
            provider.check(Duration::from_secs(300)),
            Availability::Ready { reclosed: false }
        );
        assert_eq!(provider.failure_count(), 0);
    }

    #[test]
    fn concurrent_failures_report_exactly_one_trip() {
        let registry = Arc::new(registry(&[("p", 1)]));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                registry.ordered()[0].record_failure(5)
            }));
        }
        let trips: Vec<u32> = handles
            .into_iter()
            .filter_map(|h| h.join().ok().flatten())
            .collect();
        // Exactly one thread reports the trip, with the count it crossed at.
        assert_eq!(trips, vec![5]);
    }

    #[test]
    fn deactivation_and_admin_reset() {
        let registry = registry(&[("p", 1)]);
        assert!(registry.deactivate("p"));
        assert_eq!(
            registry.ordered()[0].check(Duration::from_secs(300)),
            Availability::Inactive
        );
        assert!(!registry.ordered()[0].peek(Duration::from_secs(300)));
        assert!(registry.activate("p"));
        assert_eq!(
            registry.ordered()[0].check(Duration::from_secs(300)),
            Availability::Ready { reclosed: false }
        );

        let _ = registry.ordered()[0].record_failure(1);
        assert!(registry.reset("p"));
        assert_eq!(registry.ordered()[0].failure_count(), 0);

        assert!(!registry.reset("ghost"));
        assert!(!registry.deactivate("ghost"));
    }

    #[test]
    fn snapshot_reflects_state() {
        let registry = registry(&[("p", 1)]);
        let _ = registry.ordered()[0].record_failure(5);
        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.name, "p");
        assert!(snapshot.is_active);
        assert_eq!(snapshot.failure_count, 1);
        assert!(!snapshot.circuit_open);
        assert!(snapshot.last_failure.is_some());
    }
}
