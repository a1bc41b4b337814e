//! Error types for migration control.

use thiserror::Error;

use crate::run::RunStatus;
use crate::store::StoreError;

/// Errors returned by controller operations.
///
/// Per-file failures are never surfaced here; they are recorded in the run's
/// error list and processing continues.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Caller lacks the management capability or a valid request token.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A batch was requested while the run is not Running.
    #[error("Migration is not running (status: {status})")]
    NotRunning { status: RunStatus },

    /// Another caller holds an unexpired batch lease.
    #[error("Another batch is already being processed")]
    BatchInProgress,

    /// The batch lease expired or was reset away from its holder.
    #[error("Batch lease {id} is no longer held")]
    LeaseLost { id: u64 },

    /// The requested action is not allowed from the current status.
    #[error("Cannot {action} a migration that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: RunStatus,
    },

    /// The uploads root could not be walked. The run is now in Error.
    #[error("Failed to enumerate files: {message}")]
    EnumerationFailed { message: String },

    /// The state store failed or stayed contended.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    /// Check if the caller can succeed later without operator action.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MigrationError::BatchInProgress | MigrationError::LeaseLost { .. } => true,
            MigrationError::Store(StoreError::Contention { .. }) => true,
            MigrationError::PermissionDenied(_)
            | MigrationError::NotRunning { .. }
            | MigrationError::InvalidTransition { .. }
            | MigrationError::EnumerationFailed { .. }
            | MigrationError::Store(_) => false,
        }
    }

    /// HTTP-style status code for the status API.
    pub fn status_code(&self) -> u16 {
        match self {
            MigrationError::PermissionDenied(_) => 403,
            MigrationError::NotRunning { .. }
            | MigrationError::BatchInProgress
            | MigrationError::LeaseLost { .. }
            | MigrationError::InvalidTransition { .. } => 409,
            MigrationError::EnumerationFailed { .. } | MigrationError::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MigrationError::PermissionDenied("no".into()).status_code(), 403);
        assert_eq!(
            MigrationError::NotRunning {
                status: RunStatus::Paused
            }
            .status_code(),
            409
        );
        assert_eq!(MigrationError::BatchInProgress.status_code(), 409);
        assert_eq!(
            MigrationError::Store(StoreError::Sqlite("locked".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_display() {
        let err: MigrationError = MigrationError::InvalidTransition {
            action: "start",
            status: RunStatus::Finished,
        };
        assert_eq!(err.to_string(), "Cannot start a migration that is finished");
        assert!(!err.is_recoverable());
        assert!(MigrationError::BatchInProgress.is_recoverable());
        assert!(MigrationError::LeaseLost { id: 4 }.is_recoverable());
        assert_eq!(
            MigrationError::LeaseLost { id: 4 }.to_string(),
            "Batch lease 4 is no longer held"
        );
    }
}
