use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code used in HTTP bodies and realtime error events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidOperation(_) => "invalid_operation",
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::Config(_) | AppError::StartServer(_) => "configuration_error",
            AppError::Database(_) | AppError::Internal => "internal_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::InvalidOperation(_) => 422,
            AppError::ServiceUnavailable(_) => 503,
            _ => 500,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details stay in the logs, not in the response body.
        let message = match self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                "internal server error".to_string()
            }
            AppError::Internal | AppError::Config(_) | AppError::StartServer(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(json!({
            "error": self.code(),
            "message": message,
        }))
    }
}
