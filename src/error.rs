//! Error types for the patchlist library
//!
//! Malformed manifest lines and absent manifests are ordinary outcomes in
//! this crate, so they get their own variants that callers can match on
//! instead of string-sniffing an I/O error.

use crate::types::{Generation, ManifestKind};
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the patchlist library
pub type Result<T> = std::result::Result<T, PatchlistError>;

/// Main error type for all patchlist operations
#[derive(Debug, Error)]
pub enum PatchlistError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON configuration handling
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A manifest line or entry field could not be parsed
    #[error("Malformed manifest entry: {0}")]
    MalformedEntry(String),

    /// The requested manifest slot has never been populated
    #[error("No {generation} {kind} manifest loaded")]
    ManifestNotFound {
        /// Kind that was requested
        kind: ManifestKind,
        /// Generation that was requested
        generation: Generation,
    },

    /// Ignore pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Target directory for generation does not exist or is not a directory
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A blocking task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for PatchlistError {
    fn from(err: tokio::task::JoinError) -> Self {
        PatchlistError::TaskJoin(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for PatchlistError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        PatchlistError::ThreadPool(err.to_string())
    }
}

impl PatchlistError {
    /// Create a malformed-entry error with a custom message
    pub fn malformed(msg: impl Into<String>) -> Self {
        PatchlistError::MalformedEntry(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        PatchlistError::Internal(msg.into())
    }

    /// Check if this error means "no data yet" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, PatchlistError::ManifestNotFound { .. })
    }

    /// Check if this error comes from unparseable manifest input
    pub fn is_malformed(&self) -> bool {
        matches!(self, PatchlistError::MalformedEntry(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            PatchlistError::ManifestNotFound { kind, .. } => {
                format!(
                    "No update information available for {}. Download {} first.",
                    kind,
                    kind.manifest_file_name()
                )
            }
            PatchlistError::NotADirectory(path) => {
                format!("{:?} is not a directory. Point the generator at the content root.", path)
            }
            PatchlistError::InvalidPattern(pattern) => {
                format!("Ignore pattern {} is not a valid glob.", pattern)
            }
            _ => self.to_string(),
        }
    }
}
