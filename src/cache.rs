//! Cache-aside storage boundary.
//!
//! The failover client consumes a [`CacheBackend`] rather than owning one;
//! every interaction is best-effort. A backend failure degrades to a cache
//! miss and never fails the overall call.
//!
//! Two logical tiers share one backend, distinguished by key prefix:
//! the *primary* tier holds fresh results under the configured TTL, the
//! *emergency* tier holds the last known good value without expiry and is
//! read only after every provider has failed.

use crate::error::CacheError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key prefix of the emergency tier. [`cache_key`] output always starts
/// with a digit, so primary keys can never land in this key space.
const EMERGENCY_PREFIX: &str = "emergency:";

/// Best-effort key/value store with per-entry TTL.
///
/// Implementations must treat `ttl: None` as "never expires".
pub trait CacheBackend<T>: Send + Sync {
    /// Looks up a value. A missing or expired entry is `Ok(None)`.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<T>, CacheError>>;

    /// Stores a value. Overwrites any existing entry for the key;
    /// concurrent writers race with last-writer-wins semantics.
    fn set(
        &self,
        key: &str,
        value: T,
        ttl: Option<Duration>,
    ) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Builds the cache key for one logical call.
///
/// The key is a stable serialization of the operation name and its arguments;
/// argument order is significant and no canonicalization is applied. Each
/// component is length-prefixed so the encoding is unambiguous:
/// `("scores", ["a:b"])` and `("scores", ["a", "b"])` produce different keys
/// no matter what bytes the components contain.
pub fn cache_key(name: &str, args: &[&str]) -> String {
    let mut key =
        String::with_capacity(name.len() + args.iter().map(|a| a.len() + 4).sum::<usize>() + 4);
    push_component(&mut key, name);
    for arg in args {
        push_component(&mut key, arg);
    }
    key
}

fn push_component(key: &mut String, component: &str) {
    key.push_str(&component.len().to_string());
    key.push(':');
    key.push_str(component);
}

struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory [`CacheBackend`] with lazy expiry on read.
pub struct InMemoryCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> Default for InMemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|map| map.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    /// Returns true if the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> CacheBackend<T> for InMemoryCache<T> {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<T>, CacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| CacheError("cache lock poisoned".to_string()))?;
            match map.get(&key) {
                Some(entry) if entry.is_expired(Instant::now()) => {
                    map.remove(&key);
                    Ok(None)
                }
                Some(entry) => Ok(Some(entry.value.clone())),
                None => Ok(None),
            }
        })
    }

    fn set(
        &self,
        key: &str,
        value: T,
        ttl: Option<Duration>,
    ) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| CacheError("cache lock poisoned".to_string()))?;
            map.insert(
                key,
                Entry {
                    value,
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
            Ok(())
        })
    }
}

/// Two-tier view over a shared backend, with best-effort semantics applied.
///
/// All backend errors are logged and swallowed here so callers only ever see
/// hit or miss.
pub(crate) struct TieredCache<T> {
    backend: std::sync::Arc<dyn CacheBackend<T>>,
    primary_ttl: Duration,
}

impl<T: Clone + Send + Sync + 'static> TieredCache<T> {
    pub(crate) fn new(backend: std::sync::Arc<dyn CacheBackend<T>>, primary_ttl: Duration) -> Self {
        Self {
            backend,
            primary_ttl,
        }
    }

    /// Primary-tier lookup.
    pub(crate) async fn get_fresh(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key, error = %e, "primary cache read failed, treating as miss");
                None
            }
        }
    }

    /// Emergency-tier lookup: the last known good value, regardless of age.
    pub(crate) async fn get_stale(&self, key: &str) -> Option<T> {
        let key = format!("{EMERGENCY_PREFIX}{key}");
        match self.backend.get(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "emergency cache read failed, treating as miss");
                None
            }
        }
    }

    /// Writes through to the primary tier and, when `keep_stale` is set, to
    /// the emergency tier as the new last-known-good value.
    pub(crate) async fn put(&self, key: &str, value: T, keep_stale: bool) {
        if keep_stale {
            let stale_key = format!("{EMERGENCY_PREFIX}{key}");
            if let Err(e) = self.backend.set(&stale_key, value.clone(), None).await {
                tracing::warn!(key = %stale_key, error = %e, "emergency cache write failed");
            }
        }
        if let Err(e) = self.backend.set(key, value, Some(self.primary_ttl)).await {
            tracing::warn!(key, error = %e, "primary cache write failed");
        }
    }
}
