//! Time-bounded cache in front of a shared backing store.
//!
//! # Semantics
//!
//! - `get` returns a miss for absent and for expired rows. An expired read
//!   schedules removal of that row on a spawned task and does not wait for
//!   it.
//! - `set` stamps `expires_at = now + ttl` and upserts the whole row.
//! - `delete` is idempotent.
//! - `sweep` bulk-removes every expired row; `spawn_sweeper` runs it on a
//!   fixed interval so unread rows do not pile up.
//!
//! Backing-store failures are logged and counted here. Reads degrade to a
//! miss; writes return the error so callers may log it, but no caller is
//! expected to fail its own request because of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use relief_core::{
    CacheEntry, CacheError, CacheKey, Cacheable, Clock, ReliefResult, SystemClock, Timestamp,
};
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::memory::InMemoryCacheStore;
use super::traits::{CacheStats, CacheStore};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    write_failures: AtomicU64,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

/// Shared handle to the expiring cache. Cloning is cheap.
#[derive(Clone)]
pub struct ExpiringCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("backend", &self.inner.store.backend_name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ExpiringCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                counters: Counters::default(),
            }),
        }
    }

    /// Cache over a fresh in-process map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.store.backend_name()
    }

    fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Raw read. `None` means miss.
    pub async fn get(&self, key: &str) -> Option<JsonValue> {
        let counters = &self.inner.counters;
        let entry = match self.inner.store.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let now = self.now();
        if entry.is_expired_at(now) {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            counters.expired.fetch_add(1, Ordering::Relaxed);
            self.schedule_removal(entry.key);
            return None;
        }

        counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value)
    }

    /// Remove an expired row in the background. The row is reloaded first so
    /// a value written after the stale read is left alone.
    fn schedule_removal(&self, key: String) {
        let store = Arc::clone(&self.inner.store);
        let clock = Arc::clone(&self.inner.clock);
        tokio::spawn(async move {
            match store.load(&key).await {
                Ok(Some(entry)) if entry.is_expired_at(clock.now()) => {
                    if let Err(e) = store.remove(&key).await {
                        tracing::warn!(
                            key = %key,
                            error = %e,
                            "Failed to remove expired cache entry"
                        );
                    } else {
                        tracing::debug!(key = %key, "Removed expired cache entry");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to reload expired cache entry");
                }
            }
        });
    }

    /// Raw write. Overwrites any existing row for `key`.
    pub async fn set(&self, key: &str, value: JsonValue, ttl: Duration) -> ReliefResult<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: expiry_after(self.now(), ttl),
        };
        self.inner.store.upsert(&entry).await.inspect_err(|e| {
            self.inner
                .counters
                .write_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        })
    }

    /// Remove `key`. Absent keys are fine.
    pub async fn delete(&self, key: &str) -> ReliefResult<()> {
        self.inner.store.remove(key).await.inspect_err(|e| {
            tracing::warn!(key = %key, error = %e, "Cache delete failed");
        })
    }

    /// Remove every expired row. Returns how many rows went away.
    pub async fn sweep(&self) -> ReliefResult<u64> {
        let removed = self.inner.store.remove_expired(self.now()).await?;
        tracing::info!(
            removed,
            backend = self.backend_name(),
            "Cache sweep complete"
        );
        Ok(removed)
    }

    /// Typed read. A value that no longer decodes as `T` reads as a miss.
    pub async fn get_json<T: Cacheable>(&self, key: &CacheKey) -> Option<T> {
        if key.namespace() != T::NAMESPACE {
            tracing::warn!(
                key = %key,
                expected = %T::NAMESPACE,
                "Cache key namespace does not match value type"
            );
            return None;
        }
        let storage_key = key.as_storage_key();
        let raw = self.get(&storage_key).await?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Cached value failed to decode");
                None
            }
        }
    }

    /// Typed write under the key's namespace.
    pub async fn set_json<T: Cacheable>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> ReliefResult<()> {
        let storage_key = key.as_storage_key();
        let raw = serde_json::to_value(value).map_err(|e| CacheError::Encode {
            key: storage_key.clone(),
            reason: e.to_string(),
        })?;
        self.set(&storage_key, raw, ttl).await
    }

    /// Run `sweep` every `interval` until the handle is aborted. The first
    /// sweep happens one full interval after start.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = cache.sweep().await {
                    tracing::error!(error = %e, "Cache sweep failed");
                }
            }
        })
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
            write_failures: c.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Rows currently held by the backing store.
    pub async fn len(&self) -> ReliefResult<u64> {
        self.inner.store.len().await
    }
}

/// `now + ttl`, saturating at the largest representable instant.
fn expiry_after(now: Timestamp, ttl: Duration) -> Timestamp {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
