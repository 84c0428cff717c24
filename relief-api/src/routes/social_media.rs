//! Social Media Routes
//!
//! Keyword-filtered social reports for a disaster. Fetches go through the
//! cache; each disaster-scoped fetch is also pushed to every observer.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relief_core::SocialSource;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::ApiResult,
    events::WsEvent,
    routes::split_keywords,
    state::AppState,
};

/// Disaster id used by the generic feed.
const GENERAL_FEED: &str = "general";

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct SocialQuery {
    /// Comma-separated keywords
    pub keywords: Option<String>,
    /// `mock`, `twitter` or `bluesky`
    pub source: Option<String>,
}

impl SocialQuery {
    fn keywords(&self) -> Vec<String> {
        split_keywords(self.keywords.as_deref())
    }

    /// Unknown sources fall back to the mock feed.
    fn source(&self) -> SocialSource {
        match self.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to mock social feed");
                SocialSource::Mock
            }),
            None => SocialSource::Mock,
        }
    }
}

/// GET /api/social-media/disasters/{id}/social-media - Reports for a disaster
#[utoipa::path(
    get,
    path = "/api/social-media/disasters/{id}/social-media",
    tag = "Social Media",
    params(
        ("id" = String, Path, description = "Disaster ID"),
        SocialQuery,
    ),
    responses(
        (
            status = 200,
            description = "Social feed snapshot",
            body = relief_core::SocialFeedSnapshot
        ),
    ),
)]
pub async fn disaster_social_media(
    State(state): State<AppState>,
    Path(disaster_id): Path<String>,
    Query(query): Query<SocialQuery>,
) -> ApiResult<impl IntoResponse> {
    let keywords = query.keywords();
    let source = query.source();
    let snapshot = state
        .services
        .social_reports(&disaster_id, &keywords, source)
        .await;

    let delivery = state.broadcaster.publish_all(WsEvent::SocialMediaUpdated {
        disaster_id: disaster_id.clone(),
        reports: snapshot.reports.clone(),
        source: snapshot.source.clone(),
    });
    debug!(
        disaster_id = %disaster_id,
        source = %source,
        total = snapshot.total,
        delivered = delivery.delivered,
        "Social media snapshot served"
    );
    Ok(Json(snapshot))
}

/// GET /api/social-media/mock-social-media - Generic mock feed
#[utoipa::path(
    get,
    path = "/api/social-media/mock-social-media",
    tag = "Social Media",
    params(("keywords" = Option<String>, Query, description = "Comma-separated keywords")),
    responses(
        (
            status = 200,
            description = "Social feed snapshot",
            body = relief_core::SocialFeedSnapshot
        ),
    ),
)]
pub async fn mock_social_media(
    State(state): State<AppState>,
    Query(query): Query<SocialQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state
        .services
        .social_reports(GENERAL_FEED, &query.keywords(), SocialSource::Mock)
        .await;
    Ok(Json(snapshot))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/disasters/:id/social-media", get(disaster_social_media))
        .route("/mock-social-media", get(mock_social_media))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_fallback() {
        let query = SocialQuery {
            keywords: None,
            source: Some("myspace".to_string()),
        };
        assert_eq!(query.source(), SocialSource::Mock);
        let query = SocialQuery {
            keywords: Some("flood,help".to_string()),
            source: Some("Bluesky".to_string()),
        };
        assert_eq!(query.source(), SocialSource::Bluesky);
        assert_eq!(query.keywords(), vec!["flood", "help"]);
    }
}
