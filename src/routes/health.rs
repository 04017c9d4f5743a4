use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Health check endpoint handler.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
/// - **Response**: `{"status": "pong"}`
///
/// Used by load balancers and uptime monitors; touches nothing but the
/// process itself.
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "pong" }))
}

/// Readiness check: also verifies the store answers.
///
/// Returns 503 when the store is unreachable.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!("Store health check failed: {}", e);
        ApiError::Unavailable
    })?;
    Ok(Json(json!({ "status": "ok", "store": "up" })))
}
