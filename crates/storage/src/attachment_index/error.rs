//! Attachment index error types.

use thiserror::Error;

/// Errors that can occur during attachment index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// SQLite database error.
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// I/O error while resolving a file identity.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        IndexError::Sqlite(err.to_string())
    }
}
