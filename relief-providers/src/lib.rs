//! Relief Providers - Upstream Collaborators
//!
//! Traits for the third-party services the platform leans on, plus their
//! HTTP implementations. Nothing in this crate caches or falls back: every
//! call either returns the upstream answer or an [`UpstreamError`]. The
//! cached wrappers in `relief-api` own the cache and the fallback values.

pub mod gemini;
pub mod geocoding;
pub mod http;
pub mod official;
pub mod scraper;
pub mod social;

use async_trait::async_trait;
use relief_core::{
    GeocodeResult, GeocodeService, ImageVerification, LocationExtraction,
    OfficialUpdatesSnapshot, SocialFeedSnapshot, SocialSource, UpstreamError,
};

pub use gemini::{GeminiClient, GeminiProvider};
pub use geocoding::{GeocoderChain, GoogleMapsGeocoder, NominatimGeocoder};
pub use http::{build_client, HttpSettings};
pub use official::AgencyUpdatesFeed;
pub use scraper::PageScraper;
pub use social::MockSocialFeed;

/// Result type for upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

// ============================================================================
// AI PROVIDER
// ============================================================================

/// Text and image analysis.
#[async_trait]
pub trait AiProvider: Send + Sync + 'static {
    /// Pull a place name out of free text.
    async fn extract_location(&self, text: &str) -> UpstreamResult<LocationExtraction>;

    /// Assess whether the image at `image_url` is authentic in `context`.
    async fn verify_image(
        &self,
        image_url: &str,
        context: &str,
    ) -> UpstreamResult<ImageVerification>;

    fn name(&self) -> &str;
}

// ============================================================================
// GEOCODER
// ============================================================================

/// Place name to coordinates. `Ok(None)` means the provider answered but
/// found no match.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    async fn geocode(&self, location_name: &str) -> UpstreamResult<Option<GeocodeResult>>;

    fn service(&self) -> GeocodeService;
}

// ============================================================================
// FEEDS
// ============================================================================

/// Social-media signal for a disaster. Mock and real sources share this
/// contract.
#[async_trait]
pub trait SocialFeed: Send + Sync + 'static {
    async fn fetch(
        &self,
        disaster_id: &str,
        keywords: &[String],
        source: SocialSource,
    ) -> UpstreamResult<SocialFeedSnapshot>;
}

/// Bulletins from official agencies.
#[async_trait]
pub trait OfficialUpdatesFeed: Send + Sync + 'static {
    /// `disaster_type` of `general` means no filtering.
    async fn fetch(&self, disaster_type: &str) -> UpstreamResult<OfficialUpdatesSnapshot>;
}
