//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::chat::ChatError;
use crate::pipeline::classify::ClassificationError;
use crate::pipeline::orchestrator::PipelineError;
use crate::pipeline::preprocess::PreprocessError;
use crate::pipeline::validation::ValidationError;
use crate::symptoms::ScoreError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Upload rejected: {0}")]
    InvalidUpload(#[from] ValidationError),
    #[error("Image could not be prepared: {0}")]
    InvalidImage(#[from] PreprocessError),
    #[error("Classification failed: {0}")]
    Inference(#[from] ClassificationError),
    #[error("{0}")]
    Symptoms(#[from] ScoreError),
    #[error("{0}")]
    Chat(#[from] ChatError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::InvalidUpload(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.code(), e.to_string()),
            ApiError::InvalidImage(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_IMAGE",
                e.to_string(),
            ),
            ApiError::Inference(e) => {
                tracing::error!(error = %e, "Classifier failed during request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFERENCE_FAILED",
                    format!("The classifier could not process this image: {e}"),
                )
            }
            ApiError::Symptoms(e) => {
                let code = match e {
                    ScoreError::EmptySelection => "NO_SYMPTOMS_SELECTED",
                    ScoreError::UnknownSymptom(_) => "UNKNOWN_SYMPTOM",
                };
                (StatusCode::BAD_REQUEST, code, e.to_string())
            }
            ApiError::Chat(e) => (StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", e.to_string()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(e) => ApiError::InvalidUpload(e),
            PipelineError::Preprocess(e) => ApiError::InvalidImage(e),
            PipelineError::Classification(e) => ApiError::Inference(e),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {err}"))
    }
}
