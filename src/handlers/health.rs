use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe with a database round-trip.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database unreachable")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match crate::db::check_connection(&state.db).await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": e.to_string() })),
        ),
    }
}
