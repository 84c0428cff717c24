//! Official Updates Routes
//!
//! Bulletins from emergency agencies, filtered by disaster type.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::{error::ApiResult, routes::non_blank, state::AppState};

const GENERAL_TYPE: &str = "general";

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct UpdatesQuery {
    /// Disaster type such as `flood` or `earthquake`
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub disaster_type: Option<String>,
}

impl UpdatesQuery {
    fn disaster_type(&self) -> &str {
        non_blank(self.disaster_type.as_deref()).unwrap_or(GENERAL_TYPE)
    }
}

/// GET /api/updates/disasters/{id}/official-updates - Bulletins for a disaster
#[utoipa::path(
    get,
    path = "/api/updates/disasters/{id}/official-updates",
    tag = "Official Updates",
    params(
        ("id" = String, Path, description = "Disaster ID"),
        UpdatesQuery,
    ),
    responses(
        (
            status = 200,
            description = "Official updates",
            body = relief_core::OfficialUpdatesSnapshot
        ),
    ),
)]
pub async fn disaster_official_updates(
    State(state): State<AppState>,
    Path(disaster_id): Path<String>,
    Query(query): Query<UpdatesQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state.services.official_updates(query.disaster_type()).await;
    debug!(disaster_id = %disaster_id, total = snapshot.total, "Official updates served");
    Ok(Json(snapshot))
}

/// GET /api/updates/official-updates - Bulletins across all disasters
#[utoipa::path(
    get,
    path = "/api/updates/official-updates",
    tag = "Official Updates",
    params(UpdatesQuery),
    responses(
        (
            status = 200,
            description = "Official updates",
            body = relief_core::OfficialUpdatesSnapshot
        ),
    ),
)]
pub async fn official_updates(
    State(state): State<AppState>,
    Query(query): Query<UpdatesQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.official_updates(query.disaster_type()).await))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/disasters/:id/official-updates",
            get(disaster_official_updates),
        )
        .route("/official-updates", get(official_updates))
}
