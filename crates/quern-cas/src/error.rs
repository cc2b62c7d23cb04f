//! Error types for the content store

use thiserror::Error;

/// Result type alias using CasError
pub type Result<T> = std::result::Result<T, CasError>;

/// Errors that can occur talking to a content store
#[derive(Debug, Clone, Error)]
pub enum CasError {
    /// The backing storage failed (network, disk, quota, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// An object could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CasError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
