//! Relief Storage - Cache and Record Store
//!
//! Storage abstractions shared by the API server:
//! - [`ExpiringCache`] over a pluggable [`CacheStore`] (in-memory or LMDB;
//!   the Postgres store lives next to the connection pool in `relief-api`)
//! - [`RecordStore`] for disasters, resources, reports and the verification
//!   log, with an in-memory implementation for tests and local runs

pub mod cache;
pub mod records;

pub use cache::{
    CacheStats, CacheStore, ExpiringCache, InMemoryCacheStore, LmdbCacheError, LmdbCacheStore,
};
pub use records::{InMemoryRecordStore, RecordStore};
