//! Error types for Apiscope

use std::io;
use thiserror::Error;

use crate::orchestrator::TaskKind;

/// Result type for Apiscope operations
pub type Result<T> = std::result::Result<T, ApiscopeError>;

/// Errors that can occur in Apiscope
#[derive(Debug, Error)]
pub enum ApiscopeError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session file could not be interpreted
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Concurrency limit below one
    #[error("Invalid concurrency limit: {0} (must be >= 1)")]
    InvalidConcurrency(usize),

    /// Task kind name not part of the fixed enumeration
    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    /// Task kind enabled but no analyzer registered for it
    #[error("No analyzer registered for task kind {0}")]
    AnalyzerMissing(TaskKind),

    /// An analyzer needs input that was not supplied in the context
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Storage key rejected
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Stored record corrupted (CRC mismatch)
    #[error("Stored record '{key}' corrupted: expected CRC {expected:#x}, got {actual:#x}")]
    CorruptedData {
        /// Key of the corrupted record
        key: String,
        /// Expected CRC32 value
        expected: u32,
        /// Actual CRC32 value
        actual: u32,
    },

    /// External test generator failed
    #[error("Test generator failed: {0}")]
    Generator(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
