// middleware.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    utils::token,
    AppState,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Company,
    Admin,
}

impl ActorRole {
    pub fn to_str(&self) -> &'static str {
        match self {
            ActorRole::Client => "client",
            ActorRole::Company => "company",
            ActorRole::Admin => "admin",
        }
    }

    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "client" => Some(ActorRole::Client),
            "company" => Some(ActorRole::Company),
            "admin" => Some(ActorRole::Admin),
            _ => None,
        }
    }
}

/// The caller as established by the bearer token. Handlers pass `user_id`
/// down as the explicit actor of every state change.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl AuthenticatedActor {
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn require_role(&self, roles: &[ActorRole]) -> Result<(), HttpError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()))
        }
    }
}

pub async fn auth(
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer ").map(str::to_owned))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = token::decode_token(token, app_state.env.jwt_secret.as_bytes())?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;
    let role = ActorRole::parse(&claims.role)
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    req.extensions_mut().insert(AuthenticatedActor { user_id, role });

    Ok(next.run(req).await)
}
