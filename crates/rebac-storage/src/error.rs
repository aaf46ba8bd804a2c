//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Atomic write batch violates store invariants. Nothing was applied.
    #[error("write conflict: {message}")]
    WriteConflict { message: String },

    /// Read filter is unbounded or malformed.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Requested revision has not been committed.
    #[error("revision {requested} is newer than latest revision {latest}")]
    InvalidRevision { requested: u64, latest: u64 },

    /// Requested revision predates the oldest revision still retained.
    #[error("revision {requested} was compacted; oldest readable revision is {oldest}")]
    RevisionCompacted { requested: u64, oldest: u64 },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
