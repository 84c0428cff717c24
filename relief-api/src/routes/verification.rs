//! Image Verification Routes
//!
//! Runs an image through the AI provider (via the cache) and records the
//! outcome. The report update and the log insert happen in the background
//! and never fail the request.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relief_core::{new_entity_id, EntityId, ImageVerification, Timestamp, VerificationRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiResult},
    extractors::PathId,
    routes::{non_blank, require_disaster},
    state::{AppState, SharedRecords},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VerifyImageRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub report_id: Option<EntityId>,
    /// Extra prompt context, e.g. the report text
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VerifyImageResponse {
    pub verification: ImageVerification,
    #[schema(value_type = String, format = "uuid")]
    pub disaster_id: EntityId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub report_id: Option<EntityId>,
    pub verified_by: String,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VerificationListResponse {
    pub verifications: Vec<VerificationRecord>,
    pub total: usize,
}

/// POST /api/verification/disasters/{id}/verify-image - Check an image
#[utoipa::path(
    post,
    path = "/api/verification/disasters/{id}/verify-image",
    tag = "Verification",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    request_body = VerifyImageRequest,
    responses(
        (status = 200, description = "Verification result", body = VerifyImageResponse),
        (status = 400, description = "Missing image_url", body = ApiError),
        (status = 404, description = "Disaster not found", body = ApiError),
    ),
)]
pub async fn verify_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathId(disaster_id): PathId,
    Json(req): Json<VerifyImageRequest>,
) -> ApiResult<impl IntoResponse> {
    let image_url = non_blank(req.image_url.as_deref())
        .ok_or_else(|| ApiError::missing_field("image_url"))?
        .to_string();
    require_disaster(&state.records, disaster_id).await?;

    let verification = state
        .services
        .verify_image(&image_url, req.context.as_deref())
        .await;
    let now = state.clock.now();

    if let Some(report_id) = req.report_id {
        spawn_report_update(
            state.records.clone(),
            disaster_id,
            report_id,
            verification.clone(),
        );
    }
    spawn_log_insert(
        state.records.clone(),
        VerificationRecord {
            id: new_entity_id(),
            disaster_id,
            report_id: req.report_id,
            image_url: image_url.clone(),
            verification_result: verification.clone(),
            verified_by: user.id.clone(),
            created_at: now,
        },
    );

    info!(
        disaster_id = %disaster_id,
        user_id = %user.id,
        status = verification.status.as_str(),
        "Image verified"
    );
    Ok(Json(VerifyImageResponse {
        verification,
        disaster_id,
        report_id: req.report_id,
        verified_by: user.id.clone(),
        timestamp: now,
    }))
}

/// Only reports belonging to `disaster_id` are touched.
fn spawn_report_update(
    records: SharedRecords,
    disaster_id: EntityId,
    report_id: EntityId,
    verification: ImageVerification,
) {
    tokio::spawn(async move {
        let report = match records.report_get(report_id).await {
            Ok(Some(report)) if report.disaster_id == disaster_id => report,
            Ok(_) => {
                warn!(
                    report_id = %report_id,
                    disaster_id = %disaster_id,
                    "Report not found for disaster; skipping status update"
                );
                return;
            }
            Err(e) => {
                warn!(report_id = %report_id, error = %e, "Failed to load report for verification");
                return;
            }
        };
        if let Err(e) = records
            .report_update_verification(report.id, verification.status, &verification)
            .await
        {
            warn!(report_id = %report_id, error = %e, "Failed to update report verification");
        }
    });
}

fn spawn_log_insert(records: SharedRecords, record: VerificationRecord) {
    tokio::spawn(async move {
        if let Err(e) = records.verification_insert(&record).await {
            warn!(
                disaster_id = %record.disaster_id,
                error = %e,
                "Failed to write verification log"
            );
        }
    });
}

/// GET /api/verification/disasters/{id}/verifications - Verification log
#[utoipa::path(
    get,
    path = "/api/verification/disasters/{id}/verifications",
    tag = "Verification",
    params(("id" = Uuid, Path, description = "Disaster ID")),
    responses(
        (
            status = 200,
            description = "Verification log, newest first",
            body = VerificationListResponse
        ),
    ),
)]
pub async fn list_verifications(
    State(state): State<AppState>,
    PathId(disaster_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let verifications = state
        .records
        .verification_list_by_disaster(disaster_id)
        .await?;
    Ok(Json(VerificationListResponse {
        total: verifications.len(),
        verifications,
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/disasters/:id/verify-image", post(verify_image))
        .route("/disasters/:id/verifications", get(list_verifications))
}
