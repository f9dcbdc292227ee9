use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn timeout(what: &str) -> Self {
        Self(anyhow::anyhow!("{what} timed out"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // every upstream failure surfaces as a 500; the agent has no client
        // errors of its own to report
        let body = serde_json::json!({ "status": "error", "error": format!("{:#}", self.0) });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
