//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cache rows in a
//! memory-mapped file that survives restarts and can be shared by several
//! processes on the same host.
//!
//! # Value Format
//!
//! Each value is `[expires_at millis, little endian: 8 bytes][json value]`.
//! Keys are the UTF-8 storage form of the cache key.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `load` and `len`
//! - Write transactions for `upsert`, `remove` and `remove_expired`

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use relief_core::{CacheEntry, CacheError, ReliefResult, Timestamp};

use super::traits::CacheStore;

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for relief_core::ReliefError {
    fn from(e: LmdbCacheError) -> Self {
        let err = match e {
            LmdbCacheError::Transaction(reason) => CacheError::Transaction { reason },
            LmdbCacheError::Serialization(reason) => CacheError::Encode {
                key: String::new(),
                reason,
            },
            LmdbCacheError::Deserialization(reason) => CacheError::Decode {
                key: String::new(),
                reason,
            },
            other => CacheError::Unavailable {
                reason: other.to_string(),
            },
        };
        relief_core::ReliefError::Cache(err)
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Persistent cache store on a single unnamed LMDB database.
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheStore {
    /// Open (or create) the store under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and the directory
        // is not opened again through a second `Env` in this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    fn encode(entry: &CacheEntry) -> Result<Vec<u8>, LmdbCacheError> {
        let value_bytes = serde_json::to_vec(&entry.value)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;
        let mut full = Vec::with_capacity(EXPIRY_PREFIX_LEN + value_bytes.len());
        full.extend_from_slice(&entry.expires_at.timestamp_millis().to_le_bytes());
        full.extend_from_slice(&value_bytes);
        Ok(full)
    }

    fn decode_expiry(bytes: &[u8]) -> Result<Timestamp, LmdbCacheError> {
        let prefix: [u8; EXPIRY_PREFIX_LEN] = bytes
            .get(..EXPIRY_PREFIX_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| LmdbCacheError::Deserialization("truncated expiry prefix".into()))?;
        DateTime::from_timestamp_millis(i64::from_le_bytes(prefix))
            .ok_or_else(|| LmdbCacheError::Deserialization("expiry out of range".into()))
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<CacheEntry, LmdbCacheError> {
        let expires_at = Self::decode_expiry(bytes)?;
        let value = serde_json::from_slice(&bytes[EXPIRY_PREFIX_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        Ok(CacheEntry {
            key: key.to_string(),
            value,
            expires_at,
        })
    }

    fn expired_keys(&self, now: Timestamp) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        for item in self.db.iter(&rtxn).map_err(txn_err)? {
            let Ok((key, value)) = item else { continue };
            // Rows that cannot be decoded are swept as well.
            let expired = Self::decode_expiry(value).map_or(true, |at| at < now);
            if expired {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn load(&self, key: &str) -> ReliefResult<Option<CacheEntry>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Ok(Some(Self::decode(key, bytes)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, entry: &CacheEntry) -> ReliefResult<()> {
        let bytes = Self::encode(entry)?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, entry.key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> ReliefResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn remove_expired(&self, now: Timestamp) -> ReliefResult<u64> {
        let keys = self.expired_keys(now)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).unwrap_or(false) {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    async fn len(&self) -> ReliefResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store =
            LmdbCacheStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_roundtrip_keeps_expiry_millis() {
        let (store, _dir) = create_test_store();
        let expires_at = Utc::now() + Duration::minutes(5);
        let entry = CacheEntry {
            key: "geocode:abc".to_string(),
            value: json!({"lat": 48.85, "lng": 2.35}),
            expires_at,
        };
        store.upsert(&entry).await.expect("upsert should succeed");
        let loaded = store
            .load("geocode:abc")
            .await
            .expect("load should succeed")
            .expect("entry should exist");
        assert_eq!(loaded.value, entry.value);
        assert_eq!(
            loaded.expires_at.timestamp_millis(),
            expires_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_remove_expired_leaves_fresh_rows() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();
        for (key, offset) in [("a", -10), ("b", -1), ("c", 10)] {
            let entry = CacheEntry {
                key: key.to_string(),
                value: json!(key),
                expires_at: now + Duration::minutes(offset),
            };
            store.upsert(&entry).await.expect("upsert should succeed");
        }
        assert_eq!(store.remove_expired(now).await.expect("sweep should succeed"), 2);
        assert_eq!(store.len().await.expect("len should succeed"), 1);
        assert!(store.load("c").await.expect("load should succeed").is_some());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (store, _dir) = create_test_store();
        store.remove("nope").await.expect("first remove should succeed");
        store.remove("nope").await.expect("second remove should succeed");
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let entry = CacheEntry {
            key: "social_media:x".to_string(),
            value: json!([1, 2, 3]),
            expires_at: Utc::now() + Duration::hours(1),
        };
        {
            let store = LmdbCacheStore::open(temp_dir.path(), 10).expect("open should succeed");
            store.upsert(&entry).await.expect("upsert should succeed");
        }
        let store = LmdbCacheStore::open(temp_dir.path(), 10).expect("reopen should succeed");
        assert!(store
            .load("social_media:x")
            .await
            .expect("load should succeed")
            .is_some());
    }
}
