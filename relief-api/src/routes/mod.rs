//! REST API Routes Module
//!
//! Route handlers organized by resource family, mounted under `/api` the
//! way the dashboard front end expects:
//! - `/api/disasters` (CRUD, embedded reports)
//! - `/api/resources`, `/api/social-media`, `/api/updates`
//! - `/api/verification`, `/api/geocoding`
//! - `/api/health`, plus `/metrics`, `/openapi.json` and `/ws` at the root

pub mod disasters;
pub mod geocoding;
pub mod health;
pub mod resources;
pub mod social_media;
pub mod updates;
pub mod verification;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relief_core::{Disaster, EntityId};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::auth::USER_ID_HEADER;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{rate_limit_middleware, RateLimitState};
use crate::openapi::ApiDoc;
use crate::state::{AppState, SharedRecords};
use crate::telemetry::{metrics_handler, observability_middleware};
use crate::ws::ws_handler;

pub use disasters::create_router as disasters_router;
pub use geocoding::create_router as geocoding_router;
pub use health::create_router as health_router;
pub use resources::create_router as resources_router;
pub use social_media::create_router as social_media_router;
pub use updates::create_router as updates_router;
pub use verification::create_router as verification_router;

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Trimmed text, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Load a disaster or fail with 404.
pub(crate) async fn require_disaster(records: &SharedRecords, id: EntityId) -> ApiResult<Disaster> {
    records
        .disaster_get(id)
        .await?
        .ok_or_else(|| ApiError::disaster_not_found(id))
}

/// Comma-separated keyword list from a query string.
pub(crate) fn split_keywords(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Validate API configuration for production use.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set RELIEF_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. \
             Set RELIEF_RATE_LIMIT_ENABLED=true to enable it."
        );
    }
    Ok(())
}

/// The `/api` subtree.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/disasters", disasters::create_router())
        .nest("/resources", resources::create_router())
        .nest("/social-media", social_media::create_router())
        .nest("/updates", updates::create_router())
        .nest("/verification", verification::create_router())
        .nest("/geocoding", geocoding::create_router())
        .nest("/health", health::create_router())
}

/// Build the complete router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS
/// 2. Request tracing, body limit
/// 3. Observability (metrics + request log)
/// 4. Rate limiting (only on `/api/*`)
pub fn create_api_router(state: AppState, config: &ApiConfig) -> ApiResult<Router> {
    if config.is_production() {
        validate_api_config_for_production(config)?;
    }

    let rate_limit_state = RateLimitState::new(config.clone());
    let api = api_routes().layer(from_fn_with_state(rate_limit_state, rate_limit_middleware));

    let router = Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state);

    Ok(router
        .layer(from_fn(observability_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(config.body_limit_bytes)),
        )
        .layer(build_cors_layer(config)))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow every origin (development mode).
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Paris ")), Some("Paris"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_split_keywords() {
        assert_eq!(split_keywords(Some("flood, shelter,,")), vec!["flood", "shelter"]);
        assert!(split_keywords(None).is_empty());
    }

    #[test]
    fn test_production_requires_origins() {
        let config = ApiConfig::default();
        assert!(validate_api_config_for_production(&config).is_err());
        let config = ApiConfig {
            cors_origins: vec!["https://relief.example".to_string()],
            ..ApiConfig::default()
        };
        assert!(validate_api_config_for_production(&config).is_ok());
    }
}
