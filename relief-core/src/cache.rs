//! Cache entry, key derivation and the cacheable-value marker trait.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::Timestamp;

/// Separator between key parts. Not valid inside user text in practice,
/// so `["a b", "c"]` and `["a", "b c"]` hash differently.
const PART_SEPARATOR: u8 = 0x1f;

/// Namespaces partition the key space per upstream call site. Each
/// namespace has exactly one value type (see [`Cacheable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    AiLocation,
    AiVerify,
    Geocode,
    SocialMedia,
    OfficialUpdates,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::AiLocation => "ai_location",
            CacheNamespace::AiVerify => "ai_verify",
            CacheNamespace::Geocode => "geocode",
            CacheNamespace::SocialMedia => "social_media",
            CacheNamespace::OfficialUpdates => "official_updates",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic cache key: `<namespace>:<sha256 hex of parts>`.
///
/// Only the semantically relevant inputs go into `parts`, so identical
/// upstream inputs always collapse onto one key. The digest is full width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    digest: String,
}

impl CacheKey {
    pub fn derive(namespace: CacheNamespace, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([PART_SEPARATOR]);
            }
            hasher.update(part.as_bytes());
        }
        Self {
            namespace,
            digest: hex::encode(hasher.finalize()),
        }
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Storage form of the key.
    pub fn as_storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.digest)
    }
}

/// A stored cache row. `value` is the serialized form of the namespace's
/// value type; `expires_at` is absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: JsonValue,
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Expired entries read as misses.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }
}

/// Marker trait for values that may be stored in the expiring cache.
///
/// Ties each value type to its namespace, which is the deserialization
/// contract for every key in that namespace.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAMESPACE: CacheNamespace;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::derive(CacheNamespace::Geocode, &["Paris"]);
        let b = CacheKey::derive(CacheNamespace::Geocode, &["Paris"]);
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 64);
        assert!(a.to_string().starts_with("geocode:"));
    }

    #[test]
    fn test_namespace_partitions_keys() {
        let a = CacheKey::derive(CacheNamespace::AiLocation, &["same text"]);
        let b = CacheKey::derive(CacheNamespace::AiVerify, &["same text"]);
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_long_shared_prefix_does_not_collide() {
        let prefix = "x".repeat(200);
        let a = CacheKey::derive(CacheNamespace::AiLocation, &[&format!("{prefix}a")]);
        let b = CacheKey::derive(CacheNamespace::AiLocation, &[&format!("{prefix}b")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_part_boundaries_matter() {
        let a = CacheKey::derive(CacheNamespace::SocialMedia, &["a b", "c"]);
        let b = CacheKey::derive(CacheNamespace::SocialMedia, &["a", "b c"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".to_string(),
            value: JsonValue::Null,
            expires_at: now - Duration::seconds(1),
        };
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - Duration::seconds(2)));
    }
}
