// handler/milestones.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::projectdtos::*,
    error::HttpError,
    handler::{ensure_party_or_admin, ensure_project_client, ensure_project_company, load_milestone_with_project},
    middleware::AuthenticatedActor,
    service::error::ServiceError,
    AppState,
};

pub fn milestones_handler() -> Router {
    Router::new()
        .route("/:milestone_id", get(get_milestone))
        .route("/:milestone_id/verify", post(verify_milestone))
        .route("/:milestone_id/fund", post(initialize_funding))
        .route("/:milestone_id/mark-funded", post(mark_funded))
        .route("/:milestone_id/evidence", post(add_evidence))
        .route("/:milestone_id/submit", post(submit_milestone))
        .route("/:milestone_id/approve", post(approve_milestone))
        .route("/:milestone_id/reject", post(reject_milestone))
        .route("/:milestone_id/release", post(release_escrow))
        .route("/:milestone_id/refund", post(refund_escrow))
}

pub async fn get_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (milestone, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    let evidence = app_state.milestone_service.get_evidence(milestone_id).await?;
    let escrow = match app_state.escrow_service.get_escrow_for_milestone(milestone_id).await {
        Ok(escrow) => Some(escrow),
        Err(ServiceError::EscrowNotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let hold_reference = match &escrow {
        Some(escrow) => app_state.escrow_service.get_hold_reference(escrow.id).await?,
        None => None,
    };

    Ok(Json(ApiResponse::success(
        "Milestone retrieved successfully",
        MilestoneDetailDto { milestone, evidence, escrow, hold_reference },
    )))
}

pub async fn verify_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    Json(body): Json<VerifyMilestoneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_client(&project, &actor)?;

    let verification = app_state
        .project_service
        .verify_milestone(milestone_id, actor.user_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success("Milestone verified", verification)))
}

pub async fn initialize_funding(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    Json(body): Json<FundMilestoneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_client(&project, &actor)?;

    let init = app_state
        .escrow_service
        .initialize_funding(milestone_id, actor.user_id, &body.email)
        .await?;

    Ok(Json(ApiResponse::success("Funding initialized, complete payment to hold funds", init)))
}

pub async fn mark_funded(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_company(&project, &actor)?;

    let milestone = app_state
        .escrow_service
        .mark_funded(milestone_id, actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Milestone marked as funded", milestone)))
}

pub async fn add_evidence(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    Json(body): Json<AddEvidenceDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_company(&project, &actor)?;

    let (file, description) = body.into_parts();
    let evidence = app_state
        .milestone_service
        .add_evidence(milestone_id, actor.user_id, file, description)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Evidence uploaded successfully", evidence)),
    ))
}

pub async fn submit_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_company(&project, &actor)?;

    let milestone = app_state.milestone_service.submit(milestone_id, actor.user_id).await?;
    Ok(Json(ApiResponse::success("Milestone submitted for review", milestone)))
}

pub async fn approve_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_client(&project, &actor)?;

    let milestone = app_state.milestone_service.approve(milestone_id, actor.user_id).await?;
    Ok(Json(ApiResponse::success("Milestone approved", milestone)))
}

pub async fn reject_milestone(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    Json(body): Json<RejectMilestoneDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    ensure_project_client(&project, &actor)?;

    let (milestone, revision_request) = app_state
        .milestone_service
        .reject(milestone_id, actor.user_id, body.reason)
        .await?;

    Ok(Json(ApiResponse::success(
        "Milestone sent back for revision",
        RejectionResponseDto { milestone, revision_request },
    )))
}

/// The client releases approved work; an admin may release with
/// `admin_override` to waive the approval requirement.
pub async fn release_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    body: Option<Json<ReleaseEscrowDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    if body.admin_override && !actor.is_admin() {
        return Err(HttpError::forbidden("Only an admin can override the approval requirement"));
    }
    if !actor.is_admin() {
        ensure_project_client(&project, &actor)?;
    }

    let settled = app_state
        .escrow_service
        .release(milestone_id, actor.user_id, body.admin_override, body.payment_account_id)
        .await?;

    Ok(Json(ApiResponse::success("Escrow released to company", settled)))
}

pub async fn refund_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(milestone_id): Path<Uuid>,
    Json(body): Json<RefundEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (_, project) = load_milestone_with_project(&app_state, milestone_id).await?;
    if !actor.is_admin() {
        ensure_project_client(&project, &actor)?;
    }

    let settled = app_state
        .escrow_service
        .refund(milestone_id, actor.user_id, &body.reason)
        .await?;

    Ok(Json(ApiResponse::success("Escrow refunded to client", settled)))
}
