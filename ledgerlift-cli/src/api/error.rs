use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Body of a 500 response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub details: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file uploaded.")]
    NoFile,
    #[error("Failed to read file data: {0}")]
    BadUpload(String),
    #[error("Failed to process file: {details}")]
    Processing { details: String },
}

impl ApiError {
    /// Wrap a staging/extraction failure, keeping the full context chain as details.
    pub fn processing(err: anyhow::Error) -> Self {
        ApiError::Processing {
            details: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "No file uploaded.").into_response(),
            ApiError::BadUpload(detail) => {
                tracing::warn!(detail, "rejected upload");
                (StatusCode::BAD_REQUEST, format!("Failed to read file data: {detail}")).into_response()
            }
            ApiError::Processing { details } => {
                tracing::error!(details, "failed to process upload");
                let body = ErrorBody {
                    error: "Failed to process file.",
                    details,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
