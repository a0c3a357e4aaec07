use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Speech generation failed: {0}")]
    SynthesisError(String),

    #[error("Spreadsheet error: {0}")]
    StoreError(String),

    #[error("Invalid value for field '{field}': {message}")]
    CoercionError { field: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::MissingField(field) => (
                StatusCode::BAD_REQUEST,
                "MISSING_FIELD",
                format!("Missing required field: {}", field),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::ModelNotLoaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_NOT_LOADED",
                "Model not loaded".to_string(),
            ),
            AppError::SynthesisError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYNTHESIS_ERROR",
                msg.clone(),
            ),
            AppError::StoreError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                msg.clone(),
            ),
            AppError::CoercionError { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COERCION_ERROR",
                self.to_string(),
            ),
            AppError::IoError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
