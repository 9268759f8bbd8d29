//! Store Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend failed to execute the operation
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A lock guarding the backend was poisoned by a panicking writer
    #[error("Store lock poisoned: {0}")]
    Poisoned(String),

    /// Stored document could not be (de)serialized
    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether the failing operation could succeed if retried
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Sqlite(_))
    }
}
