use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a requested date was rejected before touching the cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDate {
    #[error("Invalid date format '{0}'. Use YYYY-MM-DD format.")]
    Malformed(String),

    #[error("Date {0} cannot be in the future.")]
    InFuture(NaiveDate),

    #[error("No picture available before 1995-06-16 (requested {0}).")]
    BeforeFirstRecord(NaiveDate),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    InvalidDate(#[from] InvalidDate),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upstream rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus { status: u16 },

    #[error("Malformed upstream payload: {0}")]
    UpstreamMalformed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited)
    }

    /// Caller mistakes that must never be retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, AppError::InvalidDate(_) | AppError::InvalidArgument(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamStatus { .. } | AppError::UpstreamMalformed(_) | AppError::Http(_)
        )
    }
}
