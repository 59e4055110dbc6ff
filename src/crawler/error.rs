use std::time::Duration;

use thiserror::Error;

/// Backlog or result store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid row {id}: {reason}")]
    InvalidRow { id: i64, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Session host failure
#[derive(Debug, Error)]
pub enum HostError {
    #[error("session creation failed: {0}")]
    Create(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("failed to read page: {0}")]
    Page(String),
}

/// Extraction failure for a loaded page
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported domain: {0}")]
    UnsupportedDomain(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("invalid pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("page unavailable: {0}")]
    Page(String),
    #[error("no response within {0:?}")]
    NoResponse(Duration),
}

impl From<HostError> for ExtractionError {
    fn from(err: HostError) -> Self {
        ExtractionError::Page(err.to_string())
    }
}
