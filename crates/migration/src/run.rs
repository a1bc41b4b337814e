//! The persisted migration run record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing started yet, or reset.
    #[default]
    Ready,
    /// Batches may be processed.
    Running,
    /// Stopped by the operator; resumable.
    Paused,
    /// Stopped by the operator; needs a reset to run again.
    Cancelled,
    /// Every file has been attempted.
    Finished,
    /// Enumeration failed; needs a reset to run again.
    Error,
}

impl RunStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ready => "ready",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Finished => "finished",
            RunStatus::Error => "error",
        }
    }

    /// Terminal states can only be left through a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Finished | RunStatus::Error
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    /// Absolute path of the file.
    pub path: String,
    /// Error message.
    pub error: String,
}

impl FileError {
    /// Create a new file error.
    pub fn new(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            error: error.into(),
        }
    }
}

/// Claim on the batch currently being processed.
///
/// Only the holder of the lease may advance the cursor. A lease that outlives
/// `expires_at_ms` belongs to a caller that died mid-batch and may be reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLease {
    /// Unique claim id (the run version that recorded the claim).
    pub id: u64,
    /// Index of the first file in the batch.
    pub start: usize,
    /// Number of files in the batch.
    pub len: usize,
    /// Epoch milliseconds after which the claim is void. The holder pushes
    /// this forward while it works.
    pub expires_at_ms: i64,
}

impl BatchLease {
    /// Check whether the lease has run out.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// The single migration record shared by every caller.
///
/// The record holds counters only. The work list and the full error history
/// live beside it in the store, so saving the record costs the same at the
/// first batch as at the last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationRun {
    /// Optimistic concurrency stamp; owned by the store.
    #[serde(skip)]
    pub version: u64,
    pub status: RunStatus,
    /// Stored work list, fixed once enumerated. Released when the run finishes.
    pub work_list: Option<u64>,
    /// Files attempted so far.
    pub cursor: usize,
    /// Length of the work list at enumeration time.
    pub total: usize,
    /// Files uploaded by this run.
    pub migrated: usize,
    /// Files that already carried a marker.
    pub skipped: usize,
    /// Per-file errors recorded so far.
    pub error_count: usize,
    /// Tail of the error history, oldest first.
    pub recent_errors: Vec<FileError>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    /// Most recent fatal error.
    pub last_error: Option<String>,
    pub lease: Option<BatchLease>,
}

impl MigrationRun {
    /// Return the run to a fresh Ready state.
    ///
    /// The version is left alone; the store bumps it on save.
    pub fn reset(&mut self) {
        let version: u64 = self.version;
        *self = MigrationRun {
            version,
            ..MigrationRun::default()
        };
    }

    /// Whether the work list still has to be computed.
    pub fn needs_enumeration(&self) -> bool {
        self.work_list.is_none() && self.total == 0
    }

    /// Files not yet attempted.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.cursor)
    }

    /// The lease, if it is still valid at `now_ms`.
    pub fn active_lease(&self, now_ms: i64) -> Option<&BatchLease> {
        self.lease
            .as_ref()
            .filter(|lease: &&BatchLease| !lease.is_expired(now_ms))
    }

    /// Percentage of files attempted, rounded to the nearest integer.
    pub fn percent_complete(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent: f64 = 100.0 * self.cursor as f64 / self.total as f64;
        percent.round().min(100.0) as u8
    }

    /// Whether `lease` is still the current claim and nothing has moved the
    /// cursor since it was taken.
    pub(crate) fn holds(&self, lease: &BatchLease) -> bool {
        self.lease.as_ref().map(|held: &BatchLease| held.id) == Some(lease.id)
            && self.cursor == lease.start
    }

    /// The most recent `limit` errors, oldest first.
    pub fn latest_errors(&self, limit: usize) -> Vec<FileError> {
        let skip: usize = self.recent_errors.len().saturating_sub(limit);
        self.recent_errors[skip..].to_vec()
    }

    /// Count new per-file errors, keeping only the last `keep` in the record.
    pub(crate) fn record_errors(&mut self, errors: &[FileError], keep: usize) {
        self.error_count += errors.len();
        self.recent_errors.extend(errors.iter().cloned());
        let excess: usize = self.recent_errors.len().saturating_sub(keep);
        self.recent_errors.drain(..excess);
    }

    /// Mark the run finished and release the work list.
    pub(crate) fn finish(&mut self, now: i64) {
        self.status = RunStatus::Finished;
        self.finished_at = Some(now);
        self.work_list = None;
        self.lease = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_progress(cursor: usize, total: usize) -> MigrationRun {
        MigrationRun {
            status: RunStatus::Running,
            work_list: Some(1),
            cursor,
            total,
            ..Default::default()
        }
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(run_with_progress(0, 0).percent_complete(), 0);
        assert_eq!(run_with_progress(10, 25).percent_complete(), 40);
        assert_eq!(run_with_progress(1, 3).percent_complete(), 33);
        assert_eq!(run_with_progress(2, 3).percent_complete(), 67);
        assert_eq!(run_with_progress(25, 25).percent_complete(), 100);
    }

    #[test]
    fn test_record_errors_keeps_latest() {
        let mut run: MigrationRun = run_with_progress(0, 0);
        let errors: Vec<FileError> = (0..15)
            .map(|i: usize| FileError::new(format!("/uploads/{}.jpg", i), "boom"))
            .collect();
        run.record_errors(&errors[..4], 10);
        run.record_errors(&errors[4..], 10);

        assert_eq!(run.error_count, 15);
        assert_eq!(run.recent_errors.len(), 10);
        assert_eq!(run.recent_errors[0].path, "/uploads/5.jpg");

        let latest: Vec<FileError> = run.latest_errors(3);
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].path, "/uploads/12.jpg");
        assert_eq!(latest[2].path, "/uploads/14.jpg");
    }

    #[test]
    fn test_reset_clears_everything_but_version() {
        let mut run: MigrationRun = run_with_progress(10, 25);
        run.version = 7;
        run.status = RunStatus::Cancelled;
        run.record_errors(&[FileError::new("/uploads/a.jpg", "boom")], 10);
        run.started_at = Some(100);
        run.last_error = Some("fatal".into());

        run.reset();

        assert_eq!(run.version, 7);
        assert_eq!(run.status, RunStatus::Ready);
        assert!(run.work_list.is_none());
        assert_eq!(run.cursor, 0);
        assert_eq!(run.total, 0);
        assert_eq!(run.error_count, 0);
        assert!(run.recent_errors.is_empty());
        assert!(run.started_at.is_none());
        assert!(run.last_error.is_none());
        assert!(run.needs_enumeration());
    }

    #[test]
    fn test_finish_releases_work_list() {
        let mut run: MigrationRun = run_with_progress(25, 25);
        run.finish(500);

        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(run.finished_at, Some(500));
        assert!(run.work_list.is_none());
        assert_eq!(run.total, 25);
        assert!(!run.needs_enumeration());
    }

    #[test]
    fn test_active_lease_expiry() {
        let mut run: MigrationRun = run_with_progress(0, 25);
        run.lease = Some(BatchLease {
            id: 3,
            start: 0,
            len: 10,
            expires_at_ms: 1_000,
        });

        assert!(run.active_lease(999).is_some());
        assert!(run.active_lease(1_000).is_none());
    }

    #[test]
    fn test_holds_lease() {
        let mut run: MigrationRun = run_with_progress(10, 25);
        let lease: BatchLease = BatchLease {
            id: 3,
            start: 10,
            len: 10,
            expires_at_ms: 1_000,
        };
        assert!(!run.holds(&lease));

        run.lease = Some(lease.clone());
        assert!(run.holds(&lease));
        assert!(!run.holds(&BatchLease { id: 4, ..lease.clone() }));

        run.cursor = 20;
        assert!(!run.holds(&lease));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert!(RunStatus::Finished.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }
}
