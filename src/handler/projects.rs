// handler/projects.rs
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
    handler::{ensure_party_or_admin, ensure_project_client, ensure_project_company},
    middleware::{ActorRole, AuthenticatedActor},
    models::projectmodel::NewMilestone,
    AppState,
};

pub fn projects_handler() -> Router {
    Router::new()
        .route("/", post(create_project).get(get_my_projects))
        .route("/:project_id", get(get_project))
        .route("/:project_id/milestones", post(create_milestones))
        .route("/:project_id/complete", post(complete_project))
        .route("/:project_id/cancel", post(cancel_project))
        .route("/:project_id/audit", get(get_project_audit))
        .route("/:project_id/disputes", post(raise_dispute).get(get_project_disputes))
}

pub async fn create_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Json(body): Json<CreateProjectDto>,
) -> Result<impl IntoResponse, HttpError> {
    actor.require_role(&[ActorRole::Client])?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let project = app_state
        .project_service
        .create_project_from_consultation(
            body.consultation_id,
            actor.user_id,
            body.title,
            body.description,
            body.budget_min,
            body.budget_max,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Project created successfully", project)),
    ))
}

pub async fn get_my_projects(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
) -> Result<impl IntoResponse, HttpError> {
    let projects = app_state
        .project_service
        .get_projects_for_user(actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Projects retrieved successfully", projects)))
}

pub async fn get_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let project = app_state.project_service.get_project(project_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    let milestones = app_state.project_service.get_project_milestones(project_id).await?;
    let disputes = app_state.dispute_service.get_project_disputes(project_id).await?;

    Ok(Json(ApiResponse::success(
        "Project retrieved successfully",
        ProjectDetailDto { project, milestones, disputes },
    )))
}

pub async fn create_milestones(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreateMilestonesDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    for milestone in &body.milestones {
        milestone
            .validate()
            .map_err(|e| HttpError::bad_request(e.to_string()))?;
    }

    let project = app_state.project_service.get_project(project_id).await?;
    ensure_project_company(&project, &actor)?;

    let milestones = app_state
        .project_service
        .create_milestones(
            project_id,
            actor.user_id,
            body.milestones.into_iter().map(NewMilestone::from).collect(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Milestones created successfully", milestones)),
    ))
}

pub async fn complete_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let project = app_state.project_service.get_project(project_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    let completed = app_state
        .project_service
        .complete_project(project_id, actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Project completed", completed)))
}

pub async fn cancel_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let project = app_state.project_service.get_project(project_id).await?;
    ensure_project_client(&project, &actor)?;

    let cancelled = app_state
        .project_service
        .cancel_project(project_id, actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Project cancelled", cancelled)))
}

pub async fn get_project_audit(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let project = app_state.project_service.get_project(project_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    let entries = app_state.audit_service.get_project_audit(project_id).await?;
    Ok(Json(ApiResponse::success("Audit trail retrieved successfully", entries)))
}

pub async fn raise_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<RaiseDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let project = app_state.project_service.get_project(project_id).await?;
    if !project.is_party(actor.user_id) {
        return Err(HttpError::forbidden("Only the project's client or company can raise a dispute"));
    }

    let dispute = app_state
        .dispute_service
        .raise_dispute(project_id, actor.user_id, body.milestone_id, body.reason)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Dispute raised successfully", dispute)),
    ))
}

pub async fn get_project_disputes(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let project = app_state.project_service.get_project(project_id).await?;
    ensure_party_or_admin(&project, &actor)?;

    let disputes = app_state.dispute_service.get_project_disputes(project_id).await?;
    Ok(Json(ApiResponse::success("Disputes retrieved successfully", disputes)))
}
