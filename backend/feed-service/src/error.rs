use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Feed store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Corrupt cache entry: {0}")]
    CacheCorrupt(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::StoreUnavailable(_)
            | AppError::UpstreamUnavailable(_)
            | AppError::CacheCorrupt(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Backend failures are logged where they happen; callers only see a generic body.
        let (error_type, message) = match self {
            AppError::Validation(_) => ("VALIDATION_ERROR", self.to_string()),
            AppError::Authentication(_) => ("AUTHENTICATION_ERROR", self.to_string()),
            _ => (
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_type.to_string(),
            message,
        })
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::CacheCorrupt(err.to_string())
    }
}
