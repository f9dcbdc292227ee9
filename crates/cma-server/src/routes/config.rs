use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::info;

use crate::state::AppState;

/// GET /config/{collector}: container-mode reload signal.
///
/// Answers 409 once after the agent rewrote the collector's config, then 200
/// until the next write. The collector's supervisor restarts it on 409.
pub async fn check_config(
    State(app): State<AppState>,
    Path(collector): Path<String>,
) -> (StatusCode, &'static str) {
    if app.notifications.take(&collector) {
        info!(collector = %collector, "config changed, signalling reload");
        (StatusCode::CONFLICT, "config changed")
    } else {
        (StatusCode::OK, "OK")
    }
}
