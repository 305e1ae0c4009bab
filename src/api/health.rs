use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;

use crate::app_state::AppState;

/// Defines health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

/// **Liveness Check**
/// - Verifies that the API is running, without touching storage
async fn liveness_check() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": "API is live" }))
}

/// **Readiness Check**
/// - Returns `500` if the database is unreachable
async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if let Some(pool) = &state.pool {
        sqlx::query("SELECT 1 FROM privilege_requests LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": "Database unavailable", "details": e.to_string() })
                        .to_string(),
                )
            })?;
    }

    Ok(Json(json!({ "success": true, "message": "API is ready" })))
}
