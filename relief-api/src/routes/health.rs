//! Health Check Endpoints
//!
//! - /api/health - Status with component details
//! - /api/health/ping - Simple liveness check
//!
//! No identity header required.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use relief_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// Always `OK` while the process serves requests
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: Timestamp,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: usize,
    pub record_store: String,
    pub cache: CacheHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CacheHealth {
    pub backend: String,
    /// Rows in the backing store. Absent when the store could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health - Service status
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.services.cache();
    let stats = cache.stats();
    let entries = match cache.len().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(error = %e, "Cache size unavailable for health check");
            None
        }
    };

    let response = HealthResponse {
        status: "OK".to_string(),
        timestamp: state.clock.now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connected_clients: state.broadcaster.connected_count(),
        record_store: state.records.backend_name().to_string(),
        cache: CacheHealth {
            backend: cache.backend_name().to_string(),
            entries,
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
        },
    };
    (StatusCode::OK, Json(response))
}

/// GET /api/health/ping - Simple pong response
#[utoipa::path(
    get,
    path = "/api/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/ping", get(ping))
}
