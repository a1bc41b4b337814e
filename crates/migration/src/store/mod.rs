//! Persistence of the single migration run record.
//!
//! Every mutation is a compare-and-swap against the record's `version`
//! stamp. A writer loads the run, changes it, and saves it only if nobody
//! else saved in between; otherwise it reloads and tries again. This keeps
//! concurrent callers (several request workers, a background driver) from
//! overwriting each other's progress.
//!
//! The work list and the error history sit beside the record. The work list
//! is written once per run and read one batch slice at a time; errors are
//! appended in the same transaction as the compare-and-swap that counts them.

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryMigrationStore;
pub use sqlite::SqliteMigrationStore;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::run::{FileError, MigrationRun};

/// Durable storage for the migration run.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Load the current run, or a fresh Ready run if none was ever saved.
    async fn load(&self) -> Result<MigrationRun, StoreError>;

    /// Save `run` if the stored version still equals `expected_version`.
    ///
    /// On success the stored version becomes `expected_version + 1` and
    /// `new_errors` are appended to the error history.
    ///
    /// # Returns
    /// `false` if another writer saved first; nothing is written.
    async fn compare_and_swap(
        &self,
        run: &MigrationRun,
        expected_version: u64,
        new_errors: &[FileError],
    ) -> Result<bool, StoreError>;

    /// Unconditionally replace the run with a fresh Ready run, dropping every
    /// work list and the error history.
    ///
    /// # Returns
    /// The new run, carrying its bumped version.
    async fn reset(&self) -> Result<MigrationRun, StoreError>;

    /// Persist an enumerated work list.
    ///
    /// # Returns
    /// Id under which the list can be read back. Ids are never reused.
    async fn save_work_list(&self, files: &[PathBuf]) -> Result<u64, StoreError>;

    /// Read `len` entries of a work list starting at `start`.
    ///
    /// Returns fewer entries if the list is shorter or was discarded.
    async fn work_list_slice(
        &self,
        list_id: u64,
        start: usize,
        len: usize,
    ) -> Result<Vec<PathBuf>, StoreError>;

    /// Drop a work list that no run refers to any more.
    async fn discard_work_list(&self, list_id: u64) -> Result<(), StoreError>;

    /// Every per-file error recorded since the last reset, oldest first.
    async fn error_history(&self) -> Result<Vec<FileError>, StoreError>;
}
