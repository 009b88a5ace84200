//! Custom error types for archivist

use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository sync failed: {0}")]
    Sync(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Another indexing run is already in progress")]
    RunLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for archivist
pub type Result<T> = std::result::Result<T, Error>;
