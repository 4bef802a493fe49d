use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Only SELECT queries are allowed for diagnostic purposes")]
    NotReadonly,

    #[error("{0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    SqlError(String),

    #[error("Execution timeout expired after {0} seconds")]
    Timeout(u64),

    #[error("Extended Event session '{0}' not found")]
    SessionNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tiberius::error::Error> for AppError {
    fn from(e: tiberius::error::Error) -> Self {
        AppError::SqlError(e.to_string())
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::NotReadonly => "NOT_READONLY",
            AppError::ConnectionFailed(_) => "CONNECTION_FAILED",
            AppError::SqlError(_) => "SQL_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Status used when the error reaches the HTTP layer. Database-facing
    /// failures are reported in a 200 body: the API call itself succeeded.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::NotReadonly => StatusCode::BAD_REQUEST,
            AppError::ConnectionFailed(_)
            | AppError::SqlError(_)
            | AppError::Timeout(_)
            | AppError::SessionNotFound(_) => StatusCode::OK,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
