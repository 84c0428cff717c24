//! Resource REST API Routes
//!
//! Shelters, medical points and supplies attached to a disaster, with
//! radius filtering around a point.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relief_core::{new_entity_id, GeoPoint, NewResource, Resource, ResourceQuery};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiResult},
    events::{ResourceAction, WsEvent},
    extractors::PathId,
    routes::{non_blank, require_disaster},
    state::AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResourceListResponse {
    pub resources: Vec<Resource>,
    pub total: usize,
    /// Search center, when the query named one.
    pub center: Option<GeoPoint>,
    pub radius_meters: f64,
}

impl ResourceListResponse {
    fn filtered(resources: Vec<Resource>, query: &ResourceQuery) -> Self {
        let resources: Vec<Resource> = resources
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        Self {
            total: resources.len(),
            resources,
            center: query.center(),
            radius_meters: query.radius_m(),
        }
    }
}

/// GET /api/resources/disasters/{id}/resources - Resources of a disaster
#[utoipa::path(
    get,
    path = "/api/resources/disasters/{id}/resources",
    tag = "Resources",
    params(
        ("id" = Uuid, Path, description = "Disaster ID"),
        ("lat" = Option<f64>, Query, description = "Search center latitude"),
        ("lon" = Option<f64>, Query, description = "Search center longitude"),
        ("radius" = Option<f64>, Query, description = "Search radius in meters (default 10000)"),
    ),
    responses(
        (status = 200, description = "Resources", body = ResourceListResponse),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn list_disaster_resources(
    State(state): State<AppState>,
    PathId(disaster_id): PathId,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<impl IntoResponse> {
    require_disaster(&state.records, disaster_id).await?;
    let resources = state.records.resource_list_by_disaster(disaster_id).await?;
    let response = ResourceListResponse::filtered(resources, &query);
    debug!(disaster_id = %disaster_id, total = response.total, "Listed resources");
    Ok(Json(response))
}

/// POST /api/resources/disasters/{id}/resources - Add a resource
#[utoipa::path(
    post,
    path = "/api/resources/disasters/{id}/resources",
    tag = "Resources",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    request_body = NewResource,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 400, description = "Missing name or type", body = ApiError),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn create_resource(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathId(disaster_id): PathId,
    Json(req): Json<NewResource>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if req.resource_type.trim().is_empty() {
        return Err(ApiError::missing_field("type"));
    }
    require_disaster(&state.records, disaster_id).await?;

    let location_name = non_blank(req.location_name.as_deref()).map(str::to_string);
    let location = match &location_name {
        Some(name) => state.services.geocode(name).await.map(|g| g.point()),
        None => None,
    };

    let resource = Resource {
        id: new_entity_id(),
        disaster_id,
        name: req.name.trim().to_string(),
        location_name,
        location,
        resource_type: req.resource_type.trim().to_string(),
        description: req.description,
        capacity: req.capacity,
        contact_info: req.contact_info,
        created_by: user.id.clone(),
        created_at: state.clock.now(),
    };
    state.records.resource_insert(&resource).await?;

    state.broadcaster.publish_all(WsEvent::ResourcesUpdated {
        action: ResourceAction::Create,
        disaster_id,
        resource: resource.clone(),
    });

    info!(
        disaster_id = %disaster_id,
        resource_id = %resource.id,
        resource_type = %resource.resource_type,
        "Resource created"
    );
    Ok((StatusCode::CREATED, Json(resource)))
}

/// GET /api/resources/nearby - Resources of any disaster near a point
#[utoipa::path(
    get,
    path = "/api/resources/nearby",
    tag = "Resources",
    params(
        ("lat" = f64, Query, description = "Search center latitude"),
        ("lon" = f64, Query, description = "Search center longitude"),
        ("radius" = Option<f64>, Query, description = "Search radius in meters (default 10000)"),
        ("type" = Option<String>, Query, description = "Only resources of this type"),
    ),
    responses(
        (status = 200, description = "Nearby resources", body = ResourceListResponse),
        (status = 400, description = "Missing lat or lon", body = ApiError),
    ),
)]
pub async fn nearby_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.center().is_none() {
        return Err(ApiError::validation_failed(
            "Latitude and longitude are required",
        ));
    }
    let resources = state
        .records
        .resource_list(query.resource_type.as_deref())
        .await?;
    Ok(Json(ResourceListResponse::filtered(resources, &query)))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/disasters/:id/resources",
            get(list_disaster_resources).post(create_resource),
        )
        .route("/nearby", get(nearby_resources))
}
