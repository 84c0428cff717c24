//! Backing-store trait for the expiring cache.
//!
//! The store persists raw [`CacheEntry`] rows and knows nothing about
//! expiry policy beyond bulk removal of rows older than a given instant.
//! Staleness checks, TTL arithmetic and typed access live in
//! [`ExpiringCache`](super::ExpiringCache).

use async_trait::async_trait;
use relief_core::{CacheEntry, ReliefResult, Timestamp};

/// Persistent key/value store holding cache rows.
///
/// Implementations must tolerate concurrent writers: `upsert` replaces the
/// whole row atomically so a reader sees either the prior row or the new
/// one, never a mix.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch the row for `key`, expired or not.
    async fn load(&self, key: &str) -> ReliefResult<Option<CacheEntry>>;

    /// Insert or overwrite the row for `entry.key`.
    async fn upsert(&self, entry: &CacheEntry) -> ReliefResult<()>;

    /// Remove the row for `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> ReliefResult<()>;

    /// Remove every row whose `expires_at` is before `now` and return how
    /// many were removed.
    async fn remove_expired(&self, now: Timestamp) -> ReliefResult<u64>;

    /// Number of rows currently stored, including expired ones.
    async fn len(&self) -> ReliefResult<u64>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Hit/miss counters kept by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub write_failures: u64,
}

impl CacheStats {
    /// Fraction of reads that hit, 0.0 when nothing was read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
