//! Records held by the record store: disasters, resources, reports and
//! the image-verification log.

use serde::{Deserialize, Deserializer, Serialize};

use crate::audit::AuditTrail;
use crate::feeds::ImageVerification;
use crate::geo::GeoPoint;
use crate::{EntityId, Timestamp};

/// Default page size for disaster listings.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Upper bound on a single page.
pub const MAX_PAGE_LIMIT: usize = 200;
/// Default search radius for resource queries, in meters.
pub const DEFAULT_RADIUS_M: f64 = 10_000.0;

/// Fields whose changes are recorded in `update` audit entries.
pub const AUDITED_DISASTER_FIELDS: &[&str] = &["title", "location_name", "description", "tags"];

// ============================================================================
// DISASTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Disaster {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub title: String,
    pub location_name: Option<String>,
    pub location: Option<GeoPoint>,
    pub description: String,
    pub tags: Vec<String>,
    pub owner_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub audit_trail: AuditTrail,
}

impl Disaster {
    /// Build a fresh record from a validated request. The trail starts with
    /// the `create` entry.
    pub fn from_new(
        id: EntityId,
        req: &NewDisaster,
        location_name: Option<String>,
        location: Option<GeoPoint>,
        owner_id: &str,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            title: req.title.trim().to_string(),
            location_name,
            location,
            description: req.description.clone(),
            tags: req.tags.clone(),
            owner_id: owner_id.to_string(),
            created_at: now,
            updated_at: now,
            audit_trail: AuditTrail::started(owner_id, now),
        }
    }

    /// Copy of `self` with the patch's user-editable fields applied.
    /// Coordinates and the audit trail are left untouched.
    pub fn patched(&self, patch: &DisasterPatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = patch.title.as_ref().filter(|t| !t.trim().is_empty()) {
            next.title = title.trim().to_string();
        }
        if let Some(location_name) = &patch.location_name {
            next.location_name = location_name.clone().filter(|n| !n.trim().is_empty());
        }
        if let Some(description) = patch.description.as_ref().filter(|d| !d.trim().is_empty()) {
            next.description = description.clone();
        }
        if let Some(tags) = &patch.tags {
            next.tags = tags.clone();
        }
        next
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Disaster with its reports and resources embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DisasterDetail {
    #[serde(flatten)]
    pub disaster: Disaster,
    pub reports: Vec<Report>,
    pub resources: Vec<Resource>,
}

/// Request body for creating a disaster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewDisaster {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for updating a disaster.
///
/// `location_name` distinguishes "absent" (`None`, leave as is) from
/// "explicit null" (`Some(None)`, clear the location).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DisasterPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub location_name: Option<Option<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for listing disasters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisasterQuery {
    pub tag: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl DisasterQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, disaster: &Disaster) -> bool {
        self.tag.as_deref().map_or(true, |tag| disaster.has_tag(tag))
            && self
                .owner_id
                .as_deref()
                .map_or(true, |owner| disaster.owner_id == owner)
    }
}

// ============================================================================
// RESOURCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Resource {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub disaster_id: EntityId,
    pub name: String,
    pub location_name: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub description: Option<String>,
    pub capacity: Option<i64>,
    pub contact_info: Option<String>,
    pub created_by: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Request body for creating a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub contact_info: Option<String>,
}

/// Geospatial and type filters for resource listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

impl ResourceQuery {
    pub fn center(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius.filter(|r| *r > 0.0).unwrap_or(DEFAULT_RADIUS_M)
    }

    /// Resources without coordinates never match a radius filter.
    pub fn matches(&self, resource: &Resource) -> bool {
        let type_ok = self
            .resource_type
            .as_deref()
            .map_or(true, |t| resource.resource_type == t);
        let center_ok = match self.center() {
            Some(center) => resource
                .location
                .is_some_and(|loc| center.within(&loc, self.radius_m())),
            None => true,
        };
        type_ok && center_ok
    }
}

// ============================================================================
// REPORT + VERIFICATION
// ============================================================================

/// Outcome of an image check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Analyzed,
    Error,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Analyzed => "analyzed",
            VerificationStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Report {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub disaster_id: EntityId,
    pub user_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub verification_status: VerificationStatus,
    pub verification_details: Option<ImageVerification>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Request body for submitting a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewReport {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Row of the `verification_log` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VerificationRecord {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub disaster_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub report_id: Option<EntityId>,
    pub image_url: String,
    pub verification_result: ImageVerification,
    pub verified_by: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}
