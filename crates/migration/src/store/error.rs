//! State store error types.

use thiserror::Error;

/// Errors that can occur while loading or saving the migration run.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite database error.
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// The stored record could not be encoded or decoded.
    #[error("Corrupt migration record: {0}")]
    Serialization(String),

    /// Optimistic writes kept losing to concurrent writers.
    #[error("Migration record still contended after {attempts} attempts")]
    Contention { attempts: u32 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
