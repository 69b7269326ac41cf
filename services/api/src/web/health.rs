//! services/api/src/web/health.rs

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::error;

use crate::web::dto::HealthResponse;
use crate::web::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service and database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "Healthy".to_string(),
                database: "Connected".to_string(),
            }),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "Unhealthy".to_string(),
                    database: "Unreachable".to_string(),
                }),
            )
        }
    }
}
