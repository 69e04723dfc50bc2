//! Error types for rating operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rating specific errors
#[derive(Debug, Error)]
pub enum RaterError {
    /// Ticker failed local validation and never reached a data source
    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    /// The data source explicitly reported the ticker as unknown
    #[error("Ticker not found: {0}")]
    TickerNotFound(String),

    /// The data source or peer universe could not be reached
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Ticker resolved but neither sub-score could be computed
    #[error("Insufficient data to rate {0}")]
    InsufficientData(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification surfaced to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    UpstreamUnavailable,
    InsufficientData,
    Internal,
}

/// Structured error returned in place of an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl RaterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RaterError::InvalidTicker(_) => ErrorKind::Validation,
            RaterError::TickerNotFound(_) => ErrorKind::NotFound,
            RaterError::UpstreamUnavailable(_) | RaterError::Network(_) => {
                ErrorKind::UpstreamUnavailable
            }
            RaterError::InsufficientData(_) => ErrorKind::InsufficientData,
            RaterError::Config(_)
            | RaterError::Json(_)
            | RaterError::Io(_)
            | RaterError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Result type alias for rating operations
pub type Result<T> = std::result::Result<T, RaterError>;

/// Convert anyhow::Error to RaterError
impl From<anyhow::Error> for RaterError {
    fn from(err: anyhow::Error) -> Self {
        RaterError::Other(err.to_string())
    }
}
