//! Error types for object store operations.

use thiserror::Error;

/// Errors that can occur while uploading to or deleting from the bucket.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Bucket or object does not exist.
    #[error("Not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Credentials lack permission for the bucket.
    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// The request failed in transit or the service rejected it.
    #[error("Object store request failed: {message}")]
    Service { message: String, retryable: bool },

    /// The local file could not be read.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Bucket settings are unusable.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl StorageError {
    /// Whether a later attempt at the same upload may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Service { retryable, .. } => *retryable,
            StorageError::NotFound { .. }
            | StorageError::AccessDenied { .. }
            | StorageError::IoError { .. }
            | StorageError::InvalidConfig { .. } => false,
        }
    }
}
