//! In-memory state store for tests and single-process embedding.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::StoreError;
use super::MigrationStore;
use crate::run::{FileError, MigrationRun};

#[derive(Debug, Default)]
struct MemoryState {
    run: MigrationRun,
    work_lists: HashMap<u64, Vec<PathBuf>>,
    last_list_id: u64,
    errors: Vec<FileError>,
}

/// State store that keeps the run in process memory.
#[derive(Debug, Default)]
pub struct MemoryMigrationStore {
    state: Mutex<MemoryState>,
}

impl MemoryMigrationStore {
    /// Create a store holding a fresh Ready run.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationStore for MemoryMigrationStore {
    async fn load(&self) -> Result<MigrationRun, StoreError> {
        Ok(self.state.lock().unwrap().run.clone())
    }

    async fn compare_and_swap(
        &self,
        run: &MigrationRun,
        expected_version: u64,
        new_errors: &[FileError],
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.run.version != expected_version {
            return Ok(false);
        }
        state.run = run.clone();
        state.run.version = expected_version + 1;
        state.errors.extend(new_errors.iter().cloned());
        Ok(true)
    }

    async fn reset(&self) -> Result<MigrationRun, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.run.reset();
        state.run.version += 1;
        state.work_lists.clear();
        state.errors.clear();
        Ok(state.run.clone())
    }

    async fn save_work_list(&self, files: &[PathBuf]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.last_list_id += 1;
        let list_id: u64 = state.last_list_id;
        state.work_lists.insert(list_id, files.to_vec());
        Ok(list_id)
    }

    async fn work_list_slice(
        &self,
        list_id: u64,
        start: usize,
        len: usize,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .work_lists
            .get(&list_id)
            .map(|files: &Vec<PathBuf>| files.iter().skip(start).take(len).cloned().collect())
            .unwrap_or_default())
    }

    async fn discard_work_list(&self, list_id: u64) -> Result<(), StoreError> {
        self.state.lock().unwrap().work_lists.remove(&list_id);
        Ok(())
    }

    async fn error_history(&self) -> Result<Vec<FileError>, StoreError> {
        Ok(self.state.lock().unwrap().errors.clone())
    }
}
