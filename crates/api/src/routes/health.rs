//! Health check endpoints for infrastructure monitoring.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Basic health check
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "bizos-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe: the process is up and serving requests.
pub async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

/// Readiness probe: the service can reach its database.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "database": "connected" })),
        ),
        Err(err) => {
            tracing::error!(error = %err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "database": "disconnected" })),
            )
        }
    }
}
