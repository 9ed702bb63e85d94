use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Client-visible failures, rendered as `{"detail": …}` JSON.
#[derive(Debug)]
pub enum ApiError {
    /// Operating on an intentionally disabled device.
    Disabled,
    /// No frame has been captured yet.
    NoFrame,
    /// Request body lacks a required field.
    MissingField(&'static str),
    /// The device failed to start.
    Start(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Disabled => (StatusCode::CONFLICT, "Camera disabled".to_string()),
            ApiError::NoFrame => (StatusCode::NOT_FOUND, "No frame available yet".to_string()),
            ApiError::MissingField(field) => {
                (StatusCode::BAD_REQUEST, format!("Missing '{field}' boolean"))
            }
            ApiError::Start(detail) | ApiError::Internal(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
