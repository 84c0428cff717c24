//! Values returned by upstream collaborators. Every type here that is
//! cached implements [`Cacheable`] with the namespace it lives under.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cache::{CacheNamespace, Cacheable};
use crate::entities::VerificationStatus;
use crate::geo::GeoPoint;
use crate::Timestamp;

/// Confidence assigned to any non-empty extraction.
pub const EXTRACTION_CONFIDENCE: f64 = 0.8;

/// Analysis text used when the image service fails.
pub const VERIFICATION_FALLBACK_ANALYSIS: &str = "Unable to verify image due to service error";

// ============================================================================
// AI RESULTS
// ============================================================================

/// Location name pulled out of free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LocationExtraction {
    pub location: Option<String>,
    pub confidence: f64,
}

impl LocationExtraction {
    pub fn found(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            confidence: EXTRACTION_CONFIDENCE,
        }
    }

    /// No location, zero confidence. Also the fallback on provider failure.
    pub fn none() -> Self {
        Self {
            location: None,
            confidence: 0.0,
        }
    }

    /// Interpret raw model output. Blank text and the literal `Unknown`
    /// both mean nothing was found.
    pub fn from_model_output(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
            Self::none()
        } else {
            Self::found(trimmed)
        }
    }

    pub fn is_found(&self) -> bool {
        self.location.is_some()
    }
}

impl Cacheable for LocationExtraction {
    const NAMESPACE: CacheNamespace = CacheNamespace::AiLocation;
}

/// Result of checking an image for authenticity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ImageVerification {
    pub analysis: String,
    pub status: VerificationStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
}

impl ImageVerification {
    pub fn analyzed(analysis: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            analysis: analysis.into(),
            status: VerificationStatus::Analyzed,
            timestamp,
        }
    }

    pub fn fallback(timestamp: Timestamp) -> Self {
        Self {
            analysis: VERIFICATION_FALLBACK_ANALYSIS.to_string(),
            status: VerificationStatus::Error,
            timestamp,
        }
    }
}

impl Cacheable for ImageVerification {
    const NAMESPACE: CacheNamespace = CacheNamespace::AiVerify;
}

// ============================================================================
// GEOCODING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum GeocodeService {
    GoogleMaps,
    Nominatim,
}

impl GeocodeService {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeService::GoogleMaps => "google_maps",
            GeocodeService::Nominatim => "nominatim",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
    pub service: GeocodeService,
}

impl GeocodeResult {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl Cacheable for GeocodeResult {
    const NAMESPACE: CacheNamespace = CacheNamespace::Geocode;
}

// ============================================================================
// SOCIAL MEDIA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

/// Which social network a feed pull targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SocialSource {
    #[default]
    Mock,
    Twitter,
    Bluesky,
}

impl SocialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialSource::Mock => "mock",
            SocialSource::Twitter => "twitter",
            SocialSource::Bluesky => "bluesky",
        }
    }
}

impl fmt::Display for SocialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(SocialSource::Mock),
            "twitter" => Ok(SocialSource::Twitter),
            "bluesky" => Ok(SocialSource::Bluesky),
            other => Err(format!("unknown social source: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SocialMediaReport {
    pub id: String,
    pub user: String,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    pub urgency: Urgency,
    pub location_mentioned: Option<String>,
    pub engagement: u32,
    pub verified: bool,
}

impl SocialMediaReport {
    /// Case-insensitive substring match against any keyword. An empty
    /// keyword list matches everything.
    pub fn mentions_any(&self, keywords: &[String]) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let content = self.content.to_lowercase();
        keywords.iter().any(|k| content.contains(&k.to_lowercase()))
    }
}

/// One pull of a social feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SocialFeedSnapshot {
    pub reports: Vec<SocialMediaReport>,
    pub total: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_updated: Timestamp,
    pub source: String,
}

impl SocialFeedSnapshot {
    pub fn new(reports: Vec<SocialMediaReport>, source: impl Into<String>, now: Timestamp) -> Self {
        Self {
            total: reports.len(),
            reports,
            last_updated: now,
            source: source.into(),
        }
    }

    pub fn empty(source: impl Into<String>, now: Timestamp) -> Self {
        Self::new(Vec::new(), source, now)
    }
}

impl Cacheable for SocialFeedSnapshot {
    const NAMESPACE: CacheNamespace = CacheNamespace::SocialMedia;
}

// ============================================================================
// OFFICIAL UPDATES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OfficialUpdate {
    pub id: String,
    pub source: String,
    pub title: String,
    pub content: String,
    pub url: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    pub priority: Urgency,
    pub category: String,
}

/// Aggregated bulletins from official agencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OfficialUpdatesSnapshot {
    pub updates: Vec<OfficialUpdate>,
    pub total: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_updated: Timestamp,
    pub sources: Vec<String>,
}

impl OfficialUpdatesSnapshot {
    pub fn new(updates: Vec<OfficialUpdate>, sources: Vec<String>, now: Timestamp) -> Self {
        Self {
            total: updates.len(),
            updates,
            last_updated: now,
            sources,
        }
    }

    pub fn empty(now: Timestamp) -> Self {
        Self::new(Vec::new(), Vec::new(), now)
    }
}

impl Cacheable for OfficialUpdatesSnapshot {
    const NAMESPACE: CacheNamespace = CacheNamespace::OfficialUpdates;
}

/// Item extracted from a scraped web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScrapedUpdate {
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
}
