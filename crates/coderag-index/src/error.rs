//! Error types for coderag-index.

use std::num::TryFromIntError;

/// Errors that can occur during scanning, indexing, and vector queries.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Embedded migration failed to apply.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Embedding backend error.
    #[error("embedding failed: {0}")]
    Embedding(#[from] coderag_llm::LlmError),

    /// Ignore pattern is not a valid glob.
    #[error("invalid ignore pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Collection exists with a different vector dimension.
    #[error("collection {collection} holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Collection was never created.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
