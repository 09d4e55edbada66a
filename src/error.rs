use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification of failures, used by callers to decide what to show
/// and what to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Source,
    AllSourcesFailed,
    Storage,
    InvalidRequest,
    Config,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("video source error: {0}")]
    Source(String),

    #[error("video source timed out after {0:?}")]
    Timeout(Duration),

    #[error("all {} channel fetches failed", .0.len())]
    AllSourcesFailed(Vec<FetchFailure>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Source(_)
            | AppError::Timeout(_)
            | AppError::Http(_)
            | AppError::Json(_)
            | AppError::Other(_) => ErrorKind::Source,
            AppError::AllSourcesFailed(_) => ErrorKind::AllSourcesFailed,
            AppError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AppError::Database(tokio_rusqlite::Error::Rusqlite(e)) | AppError::Sqlite(e)
                if is_constraint_violation(e) =>
            {
                ErrorKind::Conflict
            }
            AppError::Database(_) | AppError::Sqlite(_) | AppError::Io(_) => ErrorKind::Storage,
            AppError::Toml(_) | AppError::Config(_) => ErrorKind::Config,
        }
    }
}

/// True for UNIQUE / FOREIGN KEY / CHECK failures raised by SQLite.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// One channel whose recent uploads could not be fetched.
#[derive(Debug)]
pub struct FetchFailure {
    pub upload_list_id: String,
    pub error: AppError,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.upload_list_id, self.error)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
