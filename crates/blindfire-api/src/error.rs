use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Shape violations in a fire submission. These are the only errors the
/// probe ever sees; everything after the acknowledgment is logged instead.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("field `{field}` must match {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unexpected file field `{0}`")]
    UnexpectedFile(String),

    #[error("more than one screenshot attached")]
    DuplicateScreenshot,
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let status = match &self {
            FormError::Multipart(e) if e.status().is_client_error() => e.status(),
            _ => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Failure to turn a validated submission into a storable record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("secrets field is not valid JSON: {0}")]
    Secrets(#[from] serde_json::Error),
}
