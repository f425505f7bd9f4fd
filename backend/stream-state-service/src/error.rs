//! Error types for the stream state service
//!
//! Services report errors through `AppError`; the HTTP boundary converts them
//! to JSON responses via `ResponseError`.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

use crate::services::reconciler::store::StoreError;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed event or request; nothing was applied.
    #[error("validation error: {0}")]
    Validation(String),

    /// State store round trip failed; the transition counts as not applied.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}
