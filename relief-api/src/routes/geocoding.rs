//! Geocoding Routes
//!
//! Turn free text into a place name and coordinates. Both steps go
//! through the cache.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use relief_core::{GeocodeResult, LocationExtraction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    routes::non_blank,
    state::AppState,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeocodeRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeocodeResponse {
    pub input_text: Option<String>,
    /// Present only when the name was extracted from `text`.
    pub location_extraction: Option<LocationExtraction>,
    pub location_name: Option<String>,
    pub coordinates: Option<GeocodeResult>,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractLocationRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractLocationResponse {
    pub text: String,
    pub extraction: LocationExtraction,
}

/// POST /api/geocoding - Extract (when needed) and geocode a location
#[utoipa::path(
    post,
    path = "/api/geocoding",
    tag = "Geocoding",
    request_body = GeocodeRequest,
    responses(
        (status = 200, description = "Geocoding outcome", body = GeocodeResponse),
        (status = 400, description = "Neither text nor location_name given", body = ApiError),
    ),
)]
pub async fn geocode(
    State(state): State<AppState>,
    Json(req): Json<GeocodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = non_blank(req.text.as_deref());
    let given_name = non_blank(req.location_name.as_deref());
    if text.is_none() && given_name.is_none() {
        return Err(ApiError::validation_failed(
            "Either text or location_name is required",
        ));
    }

    let (location_extraction, location_name) = match (given_name, text) {
        (Some(name), _) => (None, Some(name.to_string())),
        (None, Some(text)) => {
            let extraction = state.services.extract_location(text).await;
            let name = extraction.location.clone();
            (Some(extraction), name)
        }
        (None, None) => (None, None),
    };

    let coordinates = match location_name.as_deref() {
        Some(name) => state.services.geocode(name).await,
        None => None,
    };
    debug!(
        location_name = ?location_name,
        resolved = coordinates.is_some(),
        "Geocoding request handled"
    );

    Ok(Json(GeocodeResponse {
        input_text: text.map(str::to_string),
        location_extraction,
        success: coordinates.is_some(),
        location_name,
        coordinates,
    }))
}

/// POST /api/geocoding/extract-location - Extract a place name from text
#[utoipa::path(
    post,
    path = "/api/geocoding/extract-location",
    tag = "Geocoding",
    request_body = ExtractLocationRequest,
    responses(
        (status = 200, description = "Extraction result", body = ExtractLocationResponse),
        (status = 400, description = "Missing text", body = ApiError),
    ),
)]
pub async fn extract_location(
    State(state): State<AppState>,
    Json(req): Json<ExtractLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    let text = non_blank(req.text.as_deref()).ok_or_else(|| ApiError::missing_field("text"))?;
    let extraction = state.services.extract_location(text).await;
    Ok(Json(ExtractLocationResponse {
        text: text.to_string(),
        extraction,
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(geocode))
        .route("/extract-location", post(extract_location))
}
