//! Property-Based Tests for the Expiring Cache
//!
//! **Property 1: Expiry**
//!
//! For any entry and any read issued after its `expires_at`, the read SHALL
//! be a miss and the row SHALL be gone from the backing store, even if the
//! clock is later moved back.
//!
//! **Property 2: Overwrite**
//!
//! For any key, `set(k, v1)` followed by `set(k, v2)` SHALL make `get(k)`
//! return `v2`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use relief_core::{CacheEntry, ManualClock, ReliefResult, Timestamp};
use relief_storage::{CacheStore, ExpiringCache, InMemoryCacheStore};
use serde_json::{json, Value as JsonValue};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

/// Store wrapper that counts removals.
#[derive(Clone, Default)]
struct CountingStore {
    inner: InMemoryCacheStore,
    removals: Arc<AtomicU64>,
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn load(&self, key: &str) -> ReliefResult<Option<CacheEntry>> {
        self.inner.load(key).await
    }

    async fn upsert(&self, entry: &CacheEntry) -> ReliefResult<()> {
        self.inner.upsert(entry).await
    }

    async fn remove(&self, key: &str) -> ReliefResult<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }

    async fn remove_expired(&self, now: Timestamp) -> ReliefResult<u64> {
        self.inner.remove_expired(now).await
    }

    async fn len(&self) -> ReliefResult<u64> {
        self.inner.len().await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn json_value_strategy() -> impl Strategy<Value = JsonValue> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,32}".prop_map(|s| json!(s)),
        ("[a-z]{1,8}", any::<bool>()).prop_map(|(k, b)| json!({ k: b })),
    ]
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// **Property 1: Expiry**
    #[test]
    fn prop_expired_read_is_miss_and_removes_once(
        key in "[a-z]{1,16}",
        value in json_value_strategy(),
        ttl_secs in 1u64..3600,
        overshoot_secs in 1i64..86_400,
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let clock = ManualClock::default();
            let store = CountingStore::default();
            let cache = ExpiringCache::with_clock(Arc::new(store.clone()), Arc::new(clock.clone()));

            cache.set(&key, value, Duration::from_secs(ttl_secs)).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let jump = TimeDelta::seconds(ttl_secs as i64 + overshoot_secs);
            clock.advance(jump);

            prop_assert_eq!(cache.get(&key).await, None);
            settle().await;
            prop_assert_eq!(store.removals.load(Ordering::SeqCst), 1);

            clock.advance(-jump);
            prop_assert_eq!(cache.get(&key).await, None);
            prop_assert_eq!(store.len().await.map_err(|e| TestCaseError::fail(e.to_string()))?, 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Reads before expiry always hit with the stored value.
    #[test]
    fn prop_read_before_expiry_hits(
        key in "[a-z]{1,16}",
        value in json_value_strategy(),
        ttl_secs in 2u64..3600,
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let clock = ManualClock::default();
            let cache = ExpiringCache::with_clock(
                Arc::new(InMemoryCacheStore::new()),
                Arc::new(clock.clone()),
            );
            cache.set(&key, value.clone(), Duration::from_secs(ttl_secs)).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            clock.advance(TimeDelta::seconds(ttl_secs as i64 - 1));
            prop_assert_eq!(cache.get(&key).await, Some(value));
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 2: Overwrite**
    #[test]
    fn prop_second_set_wins(
        key in "[a-z]{1,16}",
        first in json_value_strategy(),
        second in json_value_strategy(),
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let cache = ExpiringCache::in_memory();
            let ttl = Duration::from_secs(600);
            cache.set(&key, first, ttl).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            cache
                .set(&key, second.clone(), ttl)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(cache.get(&key).await, Some(second));
            prop_assert_eq!(cache.len().await.map_err(|e| TestCaseError::fail(e.to_string()))?, 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Sweep removes exactly the expired rows.
    #[test]
    fn prop_sweep_counts_expired(
        ttls in prop::collection::vec(1u64..120, 1..20),
        elapsed in 0i64..150,
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let clock = ManualClock::default();
            let cache = ExpiringCache::with_clock(
                Arc::new(InMemoryCacheStore::new()),
                Arc::new(clock.clone()),
            );
            for (i, ttl) in ttls.iter().enumerate() {
                cache.set(&format!("k{i}"), json!(i), Duration::from_secs(*ttl)).await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            clock.advance(TimeDelta::seconds(elapsed));
            let expected = ttls.iter().filter(|ttl| (**ttl as i64) < elapsed).count() as u64;
            let removed = cache.sweep().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(removed, expected);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
