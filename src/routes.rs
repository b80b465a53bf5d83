// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        consultations::consultations_handler,
        disputes::disputes_handler,
        milestones::milestones_handler,
        payments::{payments_handler, public_payments_handler},
        projects::projects_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check(Extension(app_state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let database = match sqlx::query("SELECT 1").execute(&app_state.db_client.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check could not reach the database: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Callback and webhook are called by the gateway, not by a logged-in user.
    let payment_routes = Router::new()
        .merge(payments_handler().layer(middleware::from_fn(auth)))
        .merge(public_payments_handler());

    let api_route = Router::new()
        .nest("/projects", projects_handler().layer(middleware::from_fn(auth)))
        .nest("/milestones", milestones_handler().layer(middleware::from_fn(auth)))
        .nest("/disputes", disputes_handler().layer(middleware::from_fn(auth)))
        .nest("/consultations", consultations_handler().layer(middleware::from_fn(auth)))
        .nest("/payments", payment_routes)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state.clone()));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .layer(Extension(app_state))
}
