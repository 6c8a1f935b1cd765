use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use actors::TrackerError;
use storage::StorageError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`TrackerError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An error from the job tracker.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// A path segment that cannot name any job.
    #[error("Job not found: {0}")]
    UnknownJob(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Tracker(err) => classify_tracker_error(err),
            AppError::UnknownJob(id) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Job {id} not found"),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a tracker error into an HTTP status, error code, and message.
fn classify_tracker_error(err: &TrackerError) -> (StatusCode, &'static str, String) {
    match err {
        TrackerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        TrackerError::Validation(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        TrackerError::NotRunning { .. } | TrackerError::NotCompleted { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        TrackerError::Storage(StorageError::SigningUnsupported(_)) => {
            (StatusCode::NOT_IMPLEMENTED, "UNSUPPORTED", err.to_string())
        }
        other => {
            tracing::error!(error = %other, "Internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
