//! Error types for the seeding state store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// Another run holds the store file for this catalog.
    #[error("state store {0} is held by another run")]
    Locked(PathBuf),

    #[error("failed to open state store: {0}")]
    Open(String),

    /// Transaction, table, read or write failure inside redb.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("retiling log entry already exists: {0}")]
    DuplicateLogEntry(String),

    #[error("retiling log entry not found: {0}")]
    LogEntryNotFound(String),
}
