//! Shared error types used across s3-offload crates.

use thiserror::Error;

/// Errors turning a local path into a root-relative object key.
#[derive(Debug, Error, Clone)]
pub enum PathError {
    /// The file does not live below the uploads root.
    #[error("{path} is not under the uploads root {root}")]
    OutsideRoot { path: String, root: String },

    /// The path names the root itself, so there is no key to derive.
    #[error("Cannot derive an object key from {path}")]
    NoObjectKey { path: String },

    /// The working directory could not be resolved.
    #[error("IO error at {path}: {message}")]
    Io { path: String, message: String },
}

impl PathError {
    /// Wrap an I/O error raised while resolving `path`.
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
