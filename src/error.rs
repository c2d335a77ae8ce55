//! Error types for ChestKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::key::Key;

/// Result type alias using ChestError
pub type Result<T> = std::result::Result<T, ChestError>;

/// Unified error type for ChestKV operations
#[derive(Debug, Error)]
pub enum ChestError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "File not found: {}; open with mode \"read-write\" to create it",
        path.display()
    )]
    FileNotFound { path: PathBuf },

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index corruption detected: {0}")]
    IndexCorrupt(String),

    #[error("Key not found: {0}")]
    KeyNotFound(Key),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Write-back Errors
    // -------------------------------------------------------------------------
    #[error("Background writer is no longer running")]
    WriterClosed,
}

impl ChestError {
    /// True for a lookup miss, the one error callers are expected to handle
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ChestError::KeyNotFound(_))
    }
}

impl From<bincode::Error> for ChestError {
    fn from(e: bincode::Error) -> Self {
        ChestError::Serialization(e.to_string())
    }
}
