// handler/disputes.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::projectdtos::*,
    error::HttpError,
    handler::ensure_party_or_admin,
    middleware::{ActorRole, AuthenticatedActor},
    AppState,
};

pub fn disputes_handler() -> Router {
    Router::new()
        .route("/:dispute_id", get(get_dispute))
        .route("/:dispute_id/resolve", put(resolve_dispute))
}

pub async fn get_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(dispute_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let dispute = app_state.dispute_service.get_dispute(dispute_id).await?;
    let project = app_state.project_service.get_project(dispute.project_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    Ok(Json(ApiResponse::success("Dispute retrieved successfully", dispute)))
}

pub async fn resolve_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<ResolveDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    actor.require_role(&[ActorRole::Admin])?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let dispute = app_state
        .dispute_service
        .resolve_dispute(dispute_id, actor.user_id, body.outcome, body.resolution)
        .await?;

    Ok(Json(ApiResponse::success("Dispute closed", dispute)))
}
