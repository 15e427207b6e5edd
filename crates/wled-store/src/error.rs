//! Error types for wled-store.

use std::path::PathBuf;

/// Result type for wled-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wled-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Device not found in the store.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A stored timestamp could not be decoded.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A stored identity could not be decoded.
    #[error("Invalid stored identity: {0}")]
    InvalidIdentity(#[from] wled_types::ParseError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused or could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether this error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}
