/// Error types for timeline-service
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Timeline not found: {0}")]
    TimelineNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimelineError {
    /// NotFound errors drive fallbacks (empty timeline, cache rebuild) instead of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TimelineError::PostNotFound(_) | TimelineError::TimelineNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TimelineError::Conflict(_))
    }
}

/// Result type alias for timeline operations
pub type TimelineResult<T> = Result<T, TimelineError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// API callers only see bad request vs internal error.
impl ResponseError for TimelineError {
    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        let message = match self {
            TimelineError::Validation(msg) => msg.clone(),
            _ => "Internal server error".to_string(),
        };

        HttpResponse::build(code).json(ErrorResponse {
            error: message,
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            TimelineError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
