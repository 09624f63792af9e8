//! Error types for the staging area.

use std::path::PathBuf;

/// Result type for staging operations.
pub type Result<T> = std::result::Result<T, StagingError>;

/// Errors that can occur while staging or releasing files.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The name was rejected before touching the filesystem
    #[error("Path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// No staged file with this name
    #[error("Staged file not found: {name}")]
    FileNotFound { name: String },

    /// Base directory could not be created
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions could not be tightened on the base directory
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Builder was missing a required setting
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl StagingError {
    pub(crate) fn invalid<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::PathValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
