// handler/payments.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        paymentdtos::{AddPaymentAccountDto, PaymentCallbackQuery},
        projectdtos::ApiResponse,
    },
    error::{ErrorMessage, HttpError},
    middleware::{ActorRole, AuthenticatedActor},
    AppState,
};

/// Routes that need a bearer token.
pub fn payments_handler() -> Router {
    Router::new()
        .route("/accounts", get(get_payment_accounts).post(add_payment_account))
        .route("/accounts/:account_id/default", put(set_default_payment_account))
        .route("/history", get(get_transaction_history))
}

/// Gateway-facing routes. The webhook authenticates by signature.
pub fn public_payments_handler() -> Router {
    Router::new()
        .route("/callback", get(payment_callback))
        .route("/webhook/paystack", post(paystack_webhook))
}

pub async fn payment_callback(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<PaymentCallbackQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let reference = query
        .reference()
        .ok_or_else(|| HttpError::bad_request("Missing payment reference"))?;

    let outcome = app_state.payment_service.finalize(reference).await?;
    Ok(Json(ApiResponse::success("Payment confirmed", outcome)))
}

/// Signature failures are 401. Once the body is authentic, business
/// rejections are acknowledged so the gateway stops retrying; infrastructure
/// failures return 5xx and are retried.
pub async fn paystack_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::InvalidWebhookSignature.to_string()))?;

    match app_state.payment_service.handle_webhook(&body, signature).await {
        Ok(Some(outcome)) => Ok((
            StatusCode::OK,
            Json(json!({ "status": "success", "data": outcome })),
        )),
        Ok(None) => Ok((StatusCode::OK, Json(json!({ "status": "ignored" })))),
        Err(e) => {
            let status = e.status_code();
            if status == StatusCode::UNAUTHORIZED || status.is_server_error() {
                return Err(e.into());
            }
            tracing::error!("Webhook payment could not be applied: {}", e);
            Ok((
                StatusCode::OK,
                Json(json!({ "status": "rejected", "message": e.to_string() })),
            ))
        }
    }
}

pub async fn add_payment_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Json(body): Json<AddPaymentAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    actor.require_role(&[ActorRole::Company])?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (account, make_default) = body.into_new_account(actor.user_id);
    let created = app_state
        .payment_service
        .add_payment_account(account, make_default)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Payment account added", created)),
    ))
}

pub async fn set_default_payment_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
    Path(account_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let account = app_state
        .payment_service
        .set_default_payment_account(actor.user_id, account_id)
        .await?;

    Ok(Json(ApiResponse::success("Default payment account updated", account)))
}

pub async fn get_payment_accounts(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
) -> Result<impl IntoResponse, HttpError> {
    let accounts = app_state
        .payment_service
        .get_payment_accounts(actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Payment accounts retrieved successfully", accounts)))
}

pub async fn get_transaction_history(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedActor>,
) -> Result<impl IntoResponse, HttpError> {
    let history = app_state
        .history_service
        .get_transaction_history(actor.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Transaction history retrieved successfully", history)))
}
