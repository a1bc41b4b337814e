//! Progress snapshots reported to callers.

use serde::{Deserialize, Serialize};

use crate::run::{FileError, MigrationRun, RunStatus};

/// Message reported when the uploads root holds no files.
pub const NOTHING_TO_MIGRATE: &str = "Nothing to migrate";

/// Point-in-time view of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: RunStatus,
    /// Files attempted.
    pub done: usize,
    /// Files in the batch currently being processed.
    pub processing: usize,
    /// Files not yet claimed by any batch.
    pub queued: usize,
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub percent_complete: u8,
    /// True once there is nothing left to attempt.
    pub complete: bool,
    pub error_count: usize,
    /// The most recent errors, oldest first.
    pub errors: Vec<FileError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Human-readable summary.
    pub message: String,
}

impl ProgressSnapshot {
    /// Build a snapshot of `run` as seen at `now`.
    ///
    /// # Arguments
    /// * `run` - The run to describe
    /// * `recent_errors_limit` - Number of errors to include
    /// * `now_ms` - Epoch milliseconds, used to decide whether the batch
    ///   lease is live
    pub fn from_run(run: &MigrationRun, recent_errors_limit: usize, now_ms: i64) -> Self {
        let processing: usize = run
            .active_lease(now_ms)
            .map_or(0, |lease| lease.len)
            .min(run.remaining());
        let complete: bool = run.status == RunStatus::Finished;

        Self {
            status: run.status,
            done: run.cursor,
            processing,
            queued: run.remaining() - processing,
            total: run.total,
            migrated: run.migrated,
            skipped: run.skipped,
            percent_complete: if complete { 100 } else { run.percent_complete() },
            complete,
            error_count: run.error_count,
            errors: run.latest_errors(recent_errors_limit),
            started_at: run.started_at,
            finished_at: run.finished_at,
            last_error: run.last_error.clone(),
            message: describe(run),
        }
    }

    /// Snapshot for a run whose root turned out to be empty.
    pub(crate) fn nothing_to_migrate(run: &MigrationRun) -> Self {
        Self {
            complete: true,
            message: NOTHING_TO_MIGRATE.to_string(),
            ..Self::from_run(run, 0, 0)
        }
    }
}

fn describe(run: &MigrationRun) -> String {
    match run.status {
        RunStatus::Ready => "Ready to migrate".to_string(),
        RunStatus::Running if run.needs_enumeration() => "Preparing file list".to_string(),
        RunStatus::Running => format!("Migrated {} of {} files", run.cursor, run.total),
        RunStatus::Paused => format!("Paused at {} of {} files", run.cursor, run.total),
        RunStatus::Cancelled => format!("Cancelled after {} of {} files", run.cursor, run.total),
        RunStatus::Finished => format!(
            "Migration complete: {} uploaded, {} already offloaded, {} failed",
            run.migrated,
            run.skipped,
            run.error_count
        ),
        RunStatus::Error => format!(
            "Migration failed: {}",
            run.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::BatchLease;

    fn running(cursor: usize, total: usize) -> MigrationRun {
        MigrationRun {
            status: RunStatus::Running,
            work_list: Some(1),
            cursor,
            total,
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_counts() {
        let mut run: MigrationRun = running(10, 25);
        run.migrated = 9;
        run.record_errors(&[FileError::new("/uploads/4.jpg", "boom")], 10);
        run.lease = Some(BatchLease {
            id: 5,
            start: 10,
            len: 10,
            expires_at_ms: 1_300,
        });

        let snapshot: ProgressSnapshot = ProgressSnapshot::from_run(&run, 10, 1_000);
        assert_eq!(snapshot.done, 10);
        assert_eq!(snapshot.processing, 10);
        assert_eq!(snapshot.queued, 5);
        assert_eq!(snapshot.percent_complete, 40);
        assert_eq!(snapshot.error_count, 1);
        assert!(!snapshot.complete);
        assert_eq!(snapshot.message, "Migrated 10 of 25 files");
    }

    #[test]
    fn test_expired_lease_is_not_processing() {
        let mut run: MigrationRun = running(20, 25);
        run.lease = Some(BatchLease {
            id: 9,
            start: 20,
            len: 5,
            expires_at_ms: 100,
        });

        let snapshot: ProgressSnapshot = ProgressSnapshot::from_run(&run, 10, 1_000);
        assert_eq!(snapshot.processing, 0);
        assert_eq!(snapshot.queued, 5);
    }

    #[test]
    fn test_finished_snapshot() {
        let mut run: MigrationRun = running(25, 25);
        run.migrated = 24;
        run.record_errors(&[FileError::new("/uploads/4.jpg", "boom")], 10);
        run.finish(2_000);

        let snapshot: ProgressSnapshot = ProgressSnapshot::from_run(&run, 10, 2_000);
        assert!(snapshot.complete);
        assert_eq!(snapshot.percent_complete, 100);
        assert_eq!(snapshot.queued, 0);
        assert_eq!(
            snapshot.message,
            "Migration complete: 24 uploaded, 0 already offloaded, 1 failed"
        );
    }

    #[test]
    fn test_nothing_to_migrate() {
        let snapshot: ProgressSnapshot = ProgressSnapshot::nothing_to_migrate(&MigrationRun::default());
        assert!(snapshot.complete);
        assert_eq!(snapshot.status, RunStatus::Ready);
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.message, NOTHING_TO_MIGRATE);
    }

    #[test]
    fn test_serialized_shape() {
        let snapshot: ProgressSnapshot = ProgressSnapshot::from_run(&running(0, 3), 10, 0);
        let value: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["queued"], 3);
        assert!(value.get("last_error").is_none());
    }
}
