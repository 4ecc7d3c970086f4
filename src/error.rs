//! Error types for AtlasDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasDB operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("log corruption at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("shrink already in progress")]
    ShrinkInProgress,

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("not found")]
    NotFound,

    #[error("index already exists: {0}")]
    IndexExists(String),

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("a transaction is already open on this thread")]
    TxAlreadyOpen,

    #[error("transaction is not writable")]
    TxNotWritable,

    #[error("database is closed")]
    DatabaseClosed,

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AtlasError {
    pub(crate) fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        AtlasError::Corruption {
            offset,
            reason: reason.into(),
        }
    }
}
