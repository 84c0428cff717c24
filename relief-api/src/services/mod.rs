//! Cache-integrated upstream services.
//!
//! Route handlers never talk to a provider directly. Every external call
//! goes through [`UpstreamServices`], which derives a cache key from the
//! relevant inputs only, serves hits without touching the provider, and
//! turns provider failures into fixed fallback values. Failures are never
//! cached, so the next call retries the provider.

pub mod cached;

use std::sync::Arc;

use chrono::Utc;
use relief_core::{
    CacheKey, CacheNamespace, GeocodeResult, ImageVerification, LocationExtraction,
    OfficialUpdatesSnapshot, SocialFeedSnapshot, SocialSource, UpstreamError,
};
use relief_providers::{AiProvider, Geocoder, OfficialUpdatesFeed, SocialFeed};
use relief_storage::ExpiringCache;

pub use cached::{CachedCall, Lookup};

use crate::config::CacheTtls;

/// Context used when a verification request carries none.
pub const DEFAULT_VERIFY_CONTEXT: &str = "disaster verification";

/// Keyword list used in cache keys when a request names none.
const NO_KEYWORDS: &str = "general";

fn ai_not_configured() -> UpstreamError {
    UpstreamError::NotConfigured {
        provider: "ai".to_string(),
    }
}

/// Sorted, deduplicated, lower-cased keywords. Two requests whose keyword
/// lists differ only in order or case share a cache entry.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

// ============================================================================
// KEY DERIVATION
// ============================================================================

pub fn location_key(text: &str) -> CacheKey {
    CacheKey::derive(CacheNamespace::AiLocation, &[text])
}

pub fn verification_key(image_url: &str) -> CacheKey {
    CacheKey::derive(CacheNamespace::AiVerify, &[image_url])
}

pub fn geocode_key(location_name: &str) -> CacheKey {
    CacheKey::derive(CacheNamespace::Geocode, &[location_name.trim()])
}

pub fn social_key(disaster_id: &str, keywords: &[String], source: SocialSource) -> CacheKey {
    let normalized = normalize_keywords(keywords);
    let joined = if normalized.is_empty() {
        NO_KEYWORDS.to_string()
    } else {
        normalized.join(",")
    };
    CacheKey::derive(
        CacheNamespace::SocialMedia,
        &[disaster_id, source.as_str(), &joined],
    )
}

pub fn official_key(disaster_type: &str) -> CacheKey {
    CacheKey::derive(
        CacheNamespace::OfficialUpdates,
        &[&disaster_type.trim().to_lowercase()],
    )
}

// ============================================================================
// UPSTREAM SERVICES
// ============================================================================

/// The providers behind the platform, each reached through the cache.
#[derive(Clone)]
pub struct UpstreamServices {
    ai: Option<Arc<dyn AiProvider>>,
    geocoder: Arc<dyn Geocoder>,
    social: Arc<dyn SocialFeed>,
    official: Arc<dyn OfficialUpdatesFeed>,
    calls: CachedCall,
    ttls: CacheTtls,
}

impl std::fmt::Debug for UpstreamServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamServices")
            .field("ai", &self.ai.as_ref().map(|ai| ai.name().to_string()))
            .field("geocoder", &self.geocoder.service())
            .field("calls", &self.calls)
            .field("ttls", &self.ttls)
            .finish()
    }
}

impl UpstreamServices {
    pub fn new(
        ai: Option<Arc<dyn AiProvider>>,
        geocoder: Arc<dyn Geocoder>,
        social: Arc<dyn SocialFeed>,
        official: Arc<dyn OfficialUpdatesFeed>,
        cache: ExpiringCache,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            ai,
            geocoder,
            social,
            official,
            calls: CachedCall::new(cache),
            ttls,
        }
    }

    pub fn cache(&self) -> &ExpiringCache {
        self.calls.cache()
    }

    fn ai_name(&self) -> String {
        self.ai
            .as_ref()
            .map_or_else(|| "ai".to_string(), |ai| ai.name().to_string())
    }

    /// Place name mentioned in `text`. Falls back to "not found".
    pub async fn extract_location(&self, text: &str) -> LocationExtraction {
        self.lookup_location(text)
            .await
            .value()
            .unwrap_or_else(LocationExtraction::none)
    }

    pub async fn lookup_location(&self, text: &str) -> Lookup<LocationExtraction> {
        let key = location_key(text);
        let provider = self.ai_name();
        self.calls
            .through_cache(&key, self.ttls.location, &provider, || async {
                match &self.ai {
                    Some(ai) => ai.extract_location(text).await.map(Some),
                    None => Err(ai_not_configured()),
                }
            })
            .await
    }

    /// Authenticity assessment of an image. Falls back to a fixed
    /// "verification failed" result.
    pub async fn verify_image(&self, image_url: &str, context: Option<&str>) -> ImageVerification {
        self.lookup_verification(image_url, context)
            .await
            .value()
            .unwrap_or_else(|| ImageVerification::fallback(Utc::now()))
    }

    /// Keyed by URL only: the context shapes the prompt, not the image.
    pub async fn lookup_verification(
        &self,
        image_url: &str,
        context: Option<&str>,
    ) -> Lookup<ImageVerification> {
        let key = verification_key(image_url);
        let provider = self.ai_name();
        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_VERIFY_CONTEXT);
        self.calls
            .through_cache(&key, self.ttls.verification, &provider, || async {
                match &self.ai {
                    Some(ai) => ai.verify_image(image_url, context).await.map(Some),
                    None => Err(ai_not_configured()),
                }
            })
            .await
    }

    /// Coordinates for a place name. `None` when nothing matched or every
    /// geocoder failed.
    pub async fn geocode(&self, location_name: &str) -> Option<GeocodeResult> {
        self.lookup_geocode(location_name).await.value()
    }

    pub async fn lookup_geocode(&self, location_name: &str) -> Lookup<GeocodeResult> {
        if location_name.trim().is_empty() {
            return Lookup::Empty;
        }
        let key = geocode_key(location_name);
        let service = self.geocoder.service().as_str();
        self.calls
            .through_cache(&key, self.ttls.geocode, service, || {
                self.geocoder.geocode(location_name.trim())
            })
            .await
    }

    /// Social reports for a disaster. Falls back to an empty snapshot.
    pub async fn social_reports(
        &self,
        disaster_id: &str,
        keywords: &[String],
        source: SocialSource,
    ) -> SocialFeedSnapshot {
        self.lookup_social(disaster_id, keywords, source)
            .await
            .value()
            .unwrap_or_else(|| SocialFeedSnapshot::empty(source.as_str(), Utc::now()))
    }

    pub async fn lookup_social(
        &self,
        disaster_id: &str,
        keywords: &[String],
        source: SocialSource,
    ) -> Lookup<SocialFeedSnapshot> {
        let key = social_key(disaster_id, keywords, source);
        let normalized = normalize_keywords(keywords);
        self.calls
            .through_cache(&key, self.ttls.social, source.as_str(), || async {
                self.social
                    .fetch(disaster_id, &normalized, source)
                    .await
                    .map(Some)
            })
            .await
    }

    /// Official bulletins. Falls back to an empty snapshot.
    pub async fn official_updates(&self, disaster_type: &str) -> OfficialUpdatesSnapshot {
        self.lookup_official(disaster_type)
            .await
            .value()
            .unwrap_or_else(|| OfficialUpdatesSnapshot::empty(Utc::now()))
    }

    pub async fn lookup_official(&self, disaster_type: &str) -> Lookup<OfficialUpdatesSnapshot> {
        let key = official_key(disaster_type);
        self.calls
            .through_cache(&key, self.ttls.official, "official_updates", || async {
                self.official.fetch(disaster_type).await.map(Some)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_normalized() {
        let keywords: Vec<String> = [" Flood", "shelter", "flood", ""]
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(normalize_keywords(&keywords), vec!["flood", "shelter"]);
    }

    #[test]
    fn test_social_key_ignores_order_and_case() {
        let a = social_key("d1", &["flood".to_string(), "Shelter".to_string()], SocialSource::Mock);
        let b = social_key("d1", &["shelter".to_string(), "FLOOD".to_string()], SocialSource::Mock);
        assert_eq!(a, b);
        assert_ne!(a, social_key("d1", &[], SocialSource::Mock));
        assert_ne!(
            a,
            social_key("d2", &["flood".to_string(), "shelter".to_string()], SocialSource::Mock)
        );
        assert_ne!(
            a,
            social_key("d1", &["flood".to_string(), "shelter".to_string()], SocialSource::Twitter)
        );
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(location_key("x").namespace(), CacheNamespace::AiLocation);
        assert_eq!(verification_key("x").namespace(), CacheNamespace::AiVerify);
        assert_eq!(geocode_key(" Paris ").namespace(), CacheNamespace::Geocode);
        assert_eq!(geocode_key(" Paris "), geocode_key("Paris"));
        assert_eq!(official_key("Flood "), official_key("flood"));
    }
}
