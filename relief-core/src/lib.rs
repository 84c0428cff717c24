//! Relief Core - Entity Types
//!
//! Pure data structures shared by every other crate in the workspace.
//! This crate performs no I/O: storage, upstream calls and the event
//! channel live in `relief-storage`, `relief-providers` and `relief-api`.

pub mod audit;
pub mod cache;
pub mod clock;
pub mod entities;
pub mod error;
pub mod feeds;
pub mod geo;
pub mod topic;
pub mod user;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use audit::{diff_changes, AuditAction, AuditTrail, AuditTrailEntry};
pub use cache::{CacheEntry, CacheKey, CacheNamespace, Cacheable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{
    Disaster, DisasterDetail, DisasterPatch, DisasterQuery, NewDisaster, NewReport, NewResource,
    Report, Resource, ResourceQuery, VerificationRecord, VerificationStatus,
};
pub use error::{
    CacheError, ReliefError, ReliefResult, StorageError, UpstreamError, ValidationError,
};
pub use feeds::{
    GeocodeResult, GeocodeService, ImageVerification, LocationExtraction, OfficialUpdate,
    OfficialUpdatesSnapshot, ScrapedUpdate, SocialMediaReport, SocialFeedSnapshot, SocialSource,
    Urgency,
};
pub use geo::GeoPoint;
pub use topic::{Audience, Topic};
pub use user::{User, UserDirectory, UserRole};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier. UUIDv7 keeps identifiers sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId.
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Entity type discriminator used in not-found errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Disaster,
    Resource,
    Report,
    Verification,
    CacheEntry,
}

impl EntityType {
    /// Name of the backing collection in the record store.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Disaster => "disasters",
            EntityType::Resource => "resources",
            EntityType::Report => "reports",
            EntityType::Verification => "verification_log",
            EntityType::CacheEntry => "cache",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityType::Disaster => "Disaster",
            EntityType::Resource => "Resource",
            EntityType::Report => "Report",
            EntityType::Verification => "Verification",
            EntityType::CacheEntry => "CacheEntry",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(EntityType::Disaster.collection(), "disasters");
        assert_eq!(EntityType::Verification.collection(), "verification_log");
        assert_eq!(EntityType::CacheEntry.collection(), "cache");
    }
}
