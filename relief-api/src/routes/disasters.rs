//! Disaster REST API Routes
//!
//! CRUD over disaster records plus field reports attached to a disaster.
//! Every mutation appends to the record's audit trail and is announced to
//! all observers as `disaster_updated`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relief_core::{
    diff_changes, new_entity_id, AuditTrailEntry, Disaster, DisasterDetail, DisasterPatch,
    DisasterQuery, NewDisaster, NewReport, ReliefError, Report, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    auth::{ensure_may_modify, CurrentUser},
    error::{ApiError, ApiResult},
    events::{DisasterChange, WsEvent},
    extractors::PathId,
    routes::{non_blank, require_disaster},
    state::AppState,
};

/// Rebuild-and-write attempts before an update gives up with 409.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// One page of disasters.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DisasterListResponse {
    pub disasters: Vec<Disaster>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ReportListResponse {
    pub reports: Vec<Report>,
    pub total: usize,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/disasters - List disasters, newest first
#[utoipa::path(
    get,
    path = "/api/disasters",
    tag = "Disasters",
    params(
        ("tag" = Option<String>, Query, description = "Only disasters carrying this tag"),
        ("owner_id" = Option<String>, Query, description = "Only disasters owned by this user"),
        ("limit" = Option<usize>, Query, description = "Page size (default 50, max 200)"),
        ("offset" = Option<usize>, Query, description = "Offset for pagination"),
    ),
    responses(
        (status = 200, description = "Page of disasters", body = DisasterListResponse),
        (status = 500, description = "Record store failure", body = ApiError),
    ),
)]
pub async fn list_disasters(
    State(state): State<AppState>,
    Query(query): Query<DisasterQuery>,
) -> ApiResult<impl IntoResponse> {
    let disasters = state.records.disaster_list(&query).await?;
    Ok(Json(DisasterListResponse {
        total: disasters.len(),
        disasters,
        limit: query.limit(),
        offset: query.offset(),
    }))
}

/// GET /api/disasters/{id} - Disaster with its reports and resources
#[utoipa::path(
    get,
    path = "/api/disasters/{id}",
    tag = "Disasters",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    responses(
        (status = 200, description = "Disaster details", body = DisasterDetail),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn get_disaster(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> ApiResult<impl IntoResponse> {
    let disaster = require_disaster(&state.records, id).await?;
    let reports = state.records.report_list_by_disaster(id).await?;
    let resources = state.records.resource_list_by_disaster(id).await?;
    Ok(Json(DisasterDetail {
        disaster,
        reports,
        resources,
    }))
}

/// POST /api/disasters - Create a disaster
///
/// Without a `location_name`, the location is extracted from the
/// description. A resolved name is geocoded.
#[utoipa::path(
    post,
    path = "/api/disasters",
    tag = "Disasters",
    request_body = NewDisaster,
    responses(
        (status = 201, description = "Disaster created", body = Disaster),
        (status = 400, description = "Missing title or description", body = ApiError),
        (status = 401, description = "Unknown user", body = ApiError),
    ),
)]
pub async fn create_disaster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewDisaster>,
) -> ApiResult<impl IntoResponse> {
    if req.title.trim().is_empty() {
        return Err(ApiError::missing_field("title"));
    }
    if req.description.trim().is_empty() {
        return Err(ApiError::missing_field("description"));
    }

    let location_name = match non_blank(req.location_name.as_deref()) {
        Some(name) => Some(name.to_string()),
        None => state.services.extract_location(&req.description).await.location,
    };
    let location = match &location_name {
        Some(name) => state.services.geocode(name).await.map(|g| g.point()),
        None => None,
    };

    let disaster = Disaster::from_new(
        new_entity_id(),
        &req,
        location_name,
        location,
        &user.id,
        state.clock.now(),
    );
    state.records.disaster_insert(&disaster).await?;

    state
        .broadcaster
        .publish_all(WsEvent::DisasterUpdated(DisasterChange::Create {
            disaster: disaster.clone(),
        }));

    info!(
        disaster_id = %disaster.id,
        user_id = %user.id,
        title = %disaster.title,
        "Disaster created"
    );
    Ok((StatusCode::CREATED, Json(disaster)))
}

/// PUT /api/disasters/{id} - Update a disaster
///
/// Appends one `update` entry holding only the fields that changed. A
/// changed `location_name` is geocoded again; an explicit null clears the
/// coordinates.
#[utoipa::path(
    put,
    path = "/api/disasters/{id}",
    tag = "Disasters",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    request_body = DisasterPatch,
    responses(
        (status = 200, description = "Disaster updated", body = Disaster),
        (status = 403, description = "Not the owner or an admin", body = ApiError),
        (status = 404, description = "Disaster not found", body = ApiError),
        (status = 409, description = "Disaster kept changing concurrently", body = ApiError),
    ),
)]
pub async fn update_disaster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathId(id): PathId,
    Json(patch): Json<DisasterPatch>,
) -> ApiResult<impl IntoResponse> {
    // Concurrent writers each read a trail and append to it; the store
    // rejects a write whose trail moved on, and the loser rebuilds.
    let mut attempt = 1;
    let next = loop {
        let existing = require_disaster(&state.records, id).await?;
        ensure_may_modify(&user, &existing.owner_id)?;

        let next = patched_with_audit(&state, &user.id, &existing, &patch).await?;
        match state
            .records
            .disaster_update(&next, existing.audit_trail.len())
            .await
        {
            Ok(()) => break next,
            Err(ReliefError::Storage(e)) if e.is_conflict() && attempt < MAX_UPDATE_ATTEMPTS => {
                debug!(disaster_id = %id, attempt, "Concurrent disaster update, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    };

    state
        .broadcaster
        .publish_all(WsEvent::DisasterUpdated(DisasterChange::Update {
            disaster: next.clone(),
        }));

    info!(disaster_id = %id, user_id = %user.id, "Disaster updated");
    Ok(Json(next))
}

/// The patched record with a fresh `update` audit entry describing what
/// changed relative to `existing`.
async fn patched_with_audit(
    state: &AppState,
    user_id: &str,
    existing: &Disaster,
    patch: &DisasterPatch,
) -> ApiResult<Disaster> {
    let mut next = existing.patched(patch);
    if next.location_name != existing.location_name {
        next.location = match next.location_name.as_deref() {
            // Keep the old coordinates when the new name does not resolve.
            Some(name) => state
                .services
                .geocode(name)
                .await
                .map(|g| g.point())
                .or(existing.location),
            None => None,
        };
    }

    let before = serde_json::to_value(existing)?;
    let after = serde_json::to_value(&next)?;
    let changes = diff_changes(&before, &after, relief_core::entities::AUDITED_DISASTER_FIELDS)
        .unwrap_or_else(|| json!({}));

    let now = state.clock.now();
    next.updated_at = now;
    next.audit_trail = std::mem::take(&mut next.audit_trail)
        .append(AuditTrailEntry::update(user_id, now, changes));
    Ok(next)
}

/// DELETE /api/disasters/{id} - Delete a disaster and everything attached
#[utoipa::path(
    delete,
    path = "/api/disasters/{id}",
    tag = "Disasters",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    responses(
        (status = 204, description = "Disaster deleted"),
        (status = 403, description = "Not the owner or an admin", body = ApiError),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn delete_disaster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathId(id): PathId,
) -> ApiResult<StatusCode> {
    let existing = require_disaster(&state.records, id).await?;
    ensure_may_modify(&user, &existing.owner_id)?;

    state.records.disaster_delete(id).await?;

    state
        .broadcaster
        .publish_all(WsEvent::DisasterUpdated(DisasterChange::Delete { disaster_id: id }));

    info!(disaster_id = %id, user_id = %user.id, "Disaster deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// REPORTS
// ============================================================================

/// POST /api/disasters/{id}/reports - Submit a field report
#[utoipa::path(
    post,
    path = "/api/disasters/{id}/reports",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report created", body = Report),
        (status = 400, description = "Missing content", body = ApiError),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn create_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathId(disaster_id): PathId,
    Json(req): Json<NewReport>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::missing_field("content"));
    }
    require_disaster(&state.records, disaster_id).await?;

    let report = Report {
        id: new_entity_id(),
        disaster_id,
        user_id: user.id.clone(),
        content: req.content.trim().to_string(),
        image_url: non_blank(req.image_url.as_deref()).map(str::to_string),
        verification_status: VerificationStatus::Pending,
        verification_details: None,
        created_at: state.clock.now(),
    };
    state.records.report_insert(&report).await?;

    info!(
        disaster_id = %disaster_id,
        report_id = %report.id,
        user_id = %user.id,
        "Report submitted"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/disasters/{id}/reports - Reports for a disaster, newest first
#[utoipa::path(
    get,
    path = "/api/disasters/{id}/reports",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    responses(
        (status = 200, description = "Reports", body = ReportListResponse),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn list_reports(
    State(state): State<AppState>,
    PathId(disaster_id): PathId,
) -> ApiResult<impl IntoResponse> {
    require_disaster(&state.records, disaster_id).await?;
    let reports = state.records.report_list_by_disaster(disaster_id).await?;
    Ok(Json(ReportListResponse {
        total: reports.len(),
        reports,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_disasters).post(create_disaster))
        .route(
            "/:id",
            get(get_disaster).put(update_disaster).delete(delete_disaster),
        )
        .route("/:id/reports", get(list_reports).post(create_report))
}
