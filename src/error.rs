// src/error.rs
// Standardized error types for the harvester

use thiserror::Error;

/// Main error type for the harvester library.
///
/// Variants correspond to the error kinds named in the design: parsers and
/// traversal recover locally from `Timeout`/`AccessibilityUnavailable`/
/// `Malformed`; ingestion recovers per-message from `EmbeddingUnavailable`;
/// store errors propagate to the caller after the retry budget.
#[derive(Error, Debug)]
pub enum HarvesterError {
    #[error("deadline exceeded")]
    Timeout,

    #[error("accessibility element unavailable: {0}")]
    AccessibilityUnavailable(String),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("transient store error (retry budget exhausted): {0}")]
    StoreTransient(String),

    #[error("fatal store error: {0}")]
    StoreFatal(String),

    #[error("invalid vector dimensions: expected {expected}, got {actual}")]
    InvalidVectorDimensions { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience alias for `Result` using `HarvesterError`.
pub type Result<T> = std::result::Result<T, HarvesterError>;

impl HarvesterError {
    /// True for errors the writer queue should retry (contention, not corruption).
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvesterError::StoreTransient(_))
    }
}

impl From<String> for HarvesterError {
    fn from(s: String) -> Self {
        HarvesterError::Other(s)
    }
}

impl From<tokio::task::JoinError> for HarvesterError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            HarvesterError::Cancelled
        } else {
            HarvesterError::Other(err.to_string())
        }
    }
}

impl From<HarvesterError> for String {
    fn from(err: HarvesterError) -> Self {
        err.to_string()
    }
}
