use axum::extract::State;
use axum::Json;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// GET /health: round-trip to the control plane's health endpoint.
///
/// `dur` is the upstream latency. Any upstream failure, including a timeout,
/// is a 500.
pub async fn get_health(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let latency = tokio::time::timeout(app.handler_timeout, app.client.health())
        .await
        .map_err(|_| AppError::timeout("control plane health check"))?
        .inspect_err(|e| warn!(error = %e, "control plane health check failed"))?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "dur": format!("{latency:?}"),
    })))
}
