//! Expiring cache and its backing stores.
//!
//! Upstream results (AI extraction, geocoding, feed pulls) are kept here
//! under deterministic [`CacheKey`](relief_core::CacheKey)s so that identical
//! inputs collapse onto one upstream call per TTL window.
//!
//! # Example
//!
//! ```ignore
//! let cache = ExpiringCache::new(Arc::new(LmdbCacheStore::open("/var/cache/relief", 512)?));
//! let key = CacheKey::derive(CacheNamespace::Geocode, &["Paris"]);
//!
//! if let Some(hit) = cache.get_json::<GeocodeResult>(&key).await {
//!     return Some(hit);
//! }
//! let fresh = geocoder.geocode("Paris").await?;
//! let _ = cache.set_json(&key, &fresh, Duration::from_secs(24 * 3600)).await;
//! ```

pub mod expiring;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use expiring::ExpiringCache;
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore};
