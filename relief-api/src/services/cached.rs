//! Cache-first upstream calls.
//!
//! [`CachedCall::through_cache`] reads the cache, and on a miss runs the
//! upstream call once per key at a time: concurrent callers for the same
//! key wait on a per-key gate and then re-read the cache instead of calling
//! the provider again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relief_core::{CacheKey, Cacheable, UpstreamError};
use relief_providers::UpstreamResult;
use relief_storage::ExpiringCache;
use tokio::sync::Mutex;

use crate::telemetry::metrics;

/// Where a value came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Served from the cache. The provider was not called.
    Hit(T),
    /// Fetched from the provider and written to the cache.
    Fresh(T),
    /// The provider answered with nothing. Not cached.
    Empty,
    /// The provider failed. Not cached.
    Failed(UpstreamError),
}

impl<T> Lookup<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Lookup::Hit(v) | Lookup::Fresh(v) => Some(v),
            Lookup::Empty | Lookup::Failed(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

#[derive(Clone)]
pub struct CachedCall {
    cache: ExpiringCache,
    gates: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for CachedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCall")
            .field("cache", &self.cache)
            .field("in_flight", &self.gates.len())
            .finish()
    }
}

impl CachedCall {
    pub fn new(cache: ExpiringCache) -> Self {
        Self {
            cache,
            gates: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &ExpiringCache {
        &self.cache
    }

    /// Serve `key` from the cache, or run `upstream` and cache a `Some`
    /// answer for `ttl`. Cache write failures are logged and the fresh
    /// value is still returned.
    pub async fn through_cache<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        provider: &str,
        upstream: F,
    ) -> Lookup<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = UpstreamResult<Option<T>>>,
    {
        let namespace = key.namespace().as_str();
        if let Some(hit) = self.cache.get_json::<T>(key).await {
            record_lookup(namespace, true);
            return Lookup::Hit(hit);
        }

        let storage_key = key.as_storage_key();
        let gate = self.gates.entry(storage_key.clone()).or_default().clone();
        let lookup = {
            let _guard = gate.lock().await;
            // Another caller may have filled the key while we waited.
            if let Some(hit) = self.cache.get_json::<T>(key).await {
                record_lookup(namespace, true);
                Lookup::Hit(hit)
            } else {
                record_lookup(namespace, false);
                self.call_and_store(key, ttl, provider, upstream).await
            }
        };
        drop(gate);
        self.gates
            .remove_if(&storage_key, |_, gate| Arc::strong_count(gate) == 1);
        lookup
    }

    async fn call_and_store<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        provider: &str,
        upstream: F,
    ) -> Lookup<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = UpstreamResult<Option<T>>>,
    {
        match upstream().await {
            Ok(Some(value)) => {
                record_upstream(provider, "ok");
                if self.cache.set_json(key, &value, ttl).await.is_err() {
                    if let Some(m) = metrics() {
                        m.record_cache_write_failure(key.namespace().as_str());
                    }
                }
                Lookup::Fresh(value)
            }
            Ok(None) => {
                record_upstream(provider, "empty");
                Lookup::Empty
            }
            Err(e) => {
                record_upstream(provider, "error");
                tracing::warn!(provider, key = %key, error = %e, "Upstream call failed");
                Lookup::Failed(e)
            }
        }
    }
}

fn record_lookup(namespace: &str, hit: bool) {
    if let Some(m) = metrics() {
        m.record_cache_lookup(namespace, hit);
    }
}

fn record_upstream(provider: &str, outcome: &str) {
    if let Some(m) = metrics() {
        m.record_upstream_call(provider, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_core::{CacheNamespace, GeocodeResult, GeocodeService};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paris() -> GeocodeResult {
        GeocodeResult {
            lat: 48.8566,
            lng: 2.3522,
            formatted_address: "Paris, France".to_string(),
            service: GeocodeService::Nominatim,
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let calls = CachedCall::new(ExpiringCache::in_memory());
        let key = CacheKey::derive(CacheNamespace::Geocode, &["Paris"]);
        let count = AtomicUsize::new(0);

        for _ in 0..3 {
            let lookup = calls
                .through_cache(&key, TTL, "test", || async {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(paris()))
                })
                .await;
            assert_eq!(lookup.value(), Some(paris()));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_and_failed_are_not_cached() {
        let calls = CachedCall::new(ExpiringCache::in_memory());
        let key = CacheKey::derive(CacheNamespace::Geocode, &["Atlantis"]);

        let lookup: Lookup<GeocodeResult> =
            calls.through_cache(&key, TTL, "test", || async { Ok(None) }).await;
        assert_eq!(lookup, Lookup::Empty);

        let err = UpstreamError::NotConfigured {
            provider: "test".to_string(),
        };
        let lookup: Lookup<GeocodeResult> = calls
            .through_cache(&key, TTL, "test", || async { Err(err.clone()) })
            .await;
        assert_eq!(lookup, Lookup::Failed(err));

        let lookup = calls
            .through_cache(&key, TTL, "test", || async { Ok(Some(paris())) })
            .await;
        assert!(matches!(lookup, Lookup::Fresh(_)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_upstream_call() {
        let calls = CachedCall::new(ExpiringCache::in_memory());
        let key = CacheKey::derive(CacheNamespace::Geocode, &["Lyon"]);
        let count = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let calls = calls.clone();
                let key = key.clone();
                let count = Arc::clone(&count);
                tokio::spawn(async move {
                    calls
                        .through_cache(&key, TTL, "test", || async move {
                            count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(Some(paris()))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let lookup = task.await.expect("task completes");
            assert!(lookup.value().is_some());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(calls.gates.len(), 0);
    }
}
