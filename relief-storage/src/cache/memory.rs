//! In-process cache store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relief_core::{CacheEntry, ReliefResult, Timestamp};
use tokio::sync::RwLock;

use super::traits::CacheStore;

/// `HashMap` behind an async lock. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self, key: &str) -> ReliefResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn upsert(&self, entry: &CacheEntry) -> ReliefResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ReliefResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_expired(&self, now: Timestamp) -> ReliefResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }

    async fn len(&self) -> ReliefResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn entry(key: &str, expires_at: Timestamp) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: json!({"k": key}),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites() -> ReliefResult<()> {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store.upsert(&entry("a", now)).await?;
        let mut second = entry("a", now + Duration::minutes(1));
        second.value = json!(2);
        store.upsert(&second).await?;
        assert_eq!(store.len().await?, 1);
        assert_eq!(store.load("a").await?.map(|e| e.value), Some(json!(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_expired_counts() -> ReliefResult<()> {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store.upsert(&entry("old", now - Duration::minutes(1))).await?;
        store.upsert(&entry("older", now - Duration::hours(1))).await?;
        store.upsert(&entry("fresh", now + Duration::minutes(1))).await?;
        assert_eq!(store.remove_expired(now).await?, 2);
        assert_eq!(store.len().await?, 1);
        assert!(store.load("fresh").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() -> ReliefResult<()> {
        let store = InMemoryCacheStore::new();
        store.remove("missing").await?;
        Ok(())
    }
}
