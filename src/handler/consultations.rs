// handler/consultations.rs
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
    dtos::{paymentdtos::BookConsultationDto, projectdtos::ApiResponse},
    error::{ErrorMessage, HttpError},
    middleware::{ActorRole, AuthenticatedActor},
    models::consultationmodel::Consultation,
    AppState,
};

pub fn consultations_handler() -> Router {
    Router::new()
        .route("/", post(book_consultation))
        .route("/:consultation_id", get(get_consultation))
        .route("/:consultation_id/complete", post(complete_consultation))
        .route("/:consultation_id/cancel", post(cancel_consultation))
}

fn ensure_consultation_access(consultation: &Consultation, actor: &AuthenticatedActor) -> Result<(), HttpError> {
    if actor.is_admin() || consultation.client_id == actor.user_id || consultation.company_id == actor.user_id {
        Ok(())
    } else {
        Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()))
    }
}

pub async fn book_consultation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Json(body): Json<BookConsultationDto>,
) -> Result<impl IntoResponse, HttpError> {
    actor.require_role(&[ActorRole::Client])?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let booking = app_state
        .consultation_service
        .book(
            actor.user_id,
            body.company_id,
            body.fee,
            body.topic,
            body.scheduled_for,
            &body.email,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Consultation booked, complete payment to confirm", booking)),
    ))
}

pub async fn get_consultation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(consultation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let consultation = app_state
        .consultation_service
        .get_consultation(consultation_id)
        .await?;
    ensure_consultation_access(&consultation, &actor)?;

    Ok(Json(ApiResponse::success("Consultation retrieved successfully", consultation)))
}

pub async fn complete_consultation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(consultation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let consultation = app_state
        .consultation_service
        .complete(consultation_id, actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Consultation completed", consultation)))
}

pub async fn cancel_consultation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(consultation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let consultation = app_state
        .consultation_service
        .cancel(consultation_id, actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Consultation cancelled", consultation)))
}
