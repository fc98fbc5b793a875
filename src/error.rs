use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("model not loaded")]
    ModelNotReady,
    #[error("required path missing: {}", .0.display())]
    PathMissing(PathBuf),
    #[error("model load failed: {0}")]
    Load(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::ModelNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::PathMissing(_)
            | ServiceError::Load(_)
            | ServiceError::Tokenizer(_)
            | ServiceError::Inference(_)
            | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "detail": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
