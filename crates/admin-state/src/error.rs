//! Error types for admin-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing persisted state
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error
    #[error("state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A document exists but does not have the expected shape
    #[error("malformed state document {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// A name that cannot be used as a document file name
    #[error("invalid document name: {0:?}")]
    InvalidName(String),
}
