//! HTTP surface for the adapter.
//!
//! - POST /notifications - push notification intake
//! - GET /healthz - liveness probe

pub mod notifications;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(notifications::receive_notification))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn healthz() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
