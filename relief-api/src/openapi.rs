//! OpenAPI Specification for the Relief API
//!
//! Generated by utoipa from the route annotations and schema derives.
//! Served at `GET /openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::USER_ID_HEADER;
use crate::error::{ApiError, ErrorCode};
use crate::routes::{disasters, geocoding, health, resources, social_media, updates, verification};
use crate::telemetry::metrics;

use relief_core::{
    AuditAction, AuditTrailEntry, Disaster, DisasterDetail, DisasterPatch, GeoPoint,
    GeocodeResult, GeocodeService, ImageVerification, LocationExtraction, NewDisaster, NewReport,
    NewResource, OfficialUpdate, OfficialUpdatesSnapshot, Report, Resource, SocialFeedSnapshot,
    SocialMediaReport, SocialSource, Urgency, VerificationRecord, VerificationStatus,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relief API",
        version = "0.1.0",
        description = "Emergency coordination backend: disasters, resources, field reports, \
                       image verification and live updates",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local Development")
    ),
    tags(
        (name = "Disasters", description = "Disaster records with audit trail"),
        (name = "Reports", description = "Field reports attached to a disaster"),
        (name = "Resources", description = "Shelters, medical points and supplies"),
        (name = "Social Media", description = "Keyword-filtered social reports"),
        (name = "Official Updates", description = "Agency bulletins"),
        (name = "Verification", description = "AI image verification"),
        (name = "Geocoding", description = "Location extraction and geocoding"),
        (name = "Health", description = "Service status"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        // === Disaster Routes ===
        disasters::list_disasters,
        disasters::get_disaster,
        disasters::create_disaster,
        disasters::update_disaster,
        disasters::delete_disaster,
        disasters::create_report,
        disasters::list_reports,

        // === Resource Routes ===
        resources::list_disaster_resources,
        resources::create_resource,
        resources::nearby_resources,

        // === Feed Routes ===
        social_media::disaster_social_media,
        social_media::mock_social_media,
        updates::disaster_official_updates,
        updates::official_updates,

        // === Verification Routes ===
        verification::verify_image,
        verification::list_verifications,

        // === Geocoding Routes ===
        geocoding::geocode,
        geocoding::extract_location,

        // === Service Routes ===
        health::health,
        health::ping,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            // === Error Types ===
            ApiError, ErrorCode,

            // === Route Types ===
            disasters::DisasterListResponse, disasters::ReportListResponse,
            resources::ResourceListResponse,
            verification::VerifyImageRequest, verification::VerifyImageResponse,
            verification::VerificationListResponse,
            geocoding::GeocodeRequest, geocoding::GeocodeResponse,
            geocoding::ExtractLocationRequest, geocoding::ExtractLocationResponse,
            health::HealthResponse, health::CacheHealth,

            // === Records (from relief-core) ===
            Disaster, DisasterDetail, NewDisaster, DisasterPatch,
            Resource, NewResource, Report, NewReport,
            VerificationRecord, VerificationStatus,
            AuditTrailEntry, AuditAction, GeoPoint,

            // === Upstream Results (from relief-core) ===
            LocationExtraction, ImageVerification, GeocodeResult, GeocodeService,
            SocialFeedSnapshot, SocialMediaReport, SocialSource, Urgency,
            OfficialUpdatesSnapshot, OfficialUpdate
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Documents the identity header.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_family() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/disasters"));
        assert!(paths.contains_key("/api/disasters/{id}"));
        assert!(paths.contains_key("/api/resources/nearby"));
        assert!(paths.contains_key("/api/verification/disasters/{id}/verify-image"));
        assert!(paths.contains_key("/api/geocoding"));
        assert!(paths.contains_key("/api/health"));
    }

    #[test]
    fn test_openapi_serializes() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&ApiDoc::openapi())?;
        assert!(json.contains("Relief API"));
        Ok(())
    }

    #[test]
    fn test_id_and_timestamp_fields_are_formatted_strings() -> Result<(), serde_json::Error> {
        let doc = serde_json::to_value(ApiDoc::openapi())?;
        let schemas = &doc["components"]["schemas"];

        let disaster = &schemas["Disaster"]["properties"];
        assert_eq!(disaster["id"]["type"], "string");
        assert_eq!(disaster["id"]["format"], "uuid");
        assert_eq!(disaster["created_at"]["format"], "date-time");
        assert_eq!(disaster["updated_at"]["format"], "date-time");

        let verification = &schemas["VerifyImageResponse"]["properties"];
        assert_eq!(verification["disaster_id"]["format"], "uuid");
        assert_eq!(verification["timestamp"]["format"], "date-time");

        let health = &schemas["HealthResponse"]["properties"];
        assert_eq!(health["timestamp"]["format"], "date-time");
        Ok(())
    }
}
