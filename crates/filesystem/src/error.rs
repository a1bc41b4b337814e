//! Error types for file system operations.

use s3_offload_common::PathError;
use thiserror::Error;

/// Errors that can occur while enumerating files.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// The enumeration root is missing or is not a directory.
    #[error("Root is not a readable directory: {path}")]
    InvalidRoot {
        /// The configured root.
        path: String,
    },

    /// IO error while walking the tree.
    #[error("IO error at {path}: {source}")]
    IoError {
        /// Path where the error occurred.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Path normalization failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A glob pattern could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern {
        /// The offending pattern(s).
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// Enumeration was stopped by the progress callback.
    #[error("Enumeration cancelled")]
    Cancelled,
}
