//! SQLite backend for the migration state store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::error::StoreError;
use super::MigrationStore;
use crate::run::{FileError, MigrationRun};

/// SQLite-based migration state store.
///
/// The run lives in a single row: the version stamp in its own column and
/// the counters as JSON. The conditional `UPDATE ... WHERE version` is atomic
/// in SQLite, so several processes may share one database file. Work lists
/// and the error history live in their own tables, one row per entry.
pub struct SqliteMigrationStore {
    /// Database connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    /// Table names (versioned for schema migrations).
    tables: Tables,
}

struct Tables {
    run: String,
    lists: String,
    files: String,
    errors: String,
}

impl Tables {
    fn new(version: u32) -> Self {
        Self {
            run: format!("migration_run_v{}", version),
            lists: format!("migration_work_lists_v{}", version),
            files: format!("migration_work_files_v{}", version),
            errors: format!("migration_errors_v{}", version),
        }
    }
}

impl SqliteMigrationStore {
    /// Database schema version.
    const STATE_DB_VERSION: u32 = 1;

    /// Row id of the one and only run.
    const RUN_ID: i64 = 1;

    /// Create or open a store at the given path.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn: Connection = Connection::open(db_path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::initialize(conn)
    }

    /// Create a store held entirely in memory.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        let tables: Tables = Tables::new(Self::STATE_DB_VERSION);

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {run} (
                id INTEGER PRIMARY KEY,
                version INTEGER NOT NULL,
                state TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {lists} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                total INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {files} (
                list_id INTEGER NOT NULL,
                idx INTEGER NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY (list_id, idx)
            );
            CREATE TABLE IF NOT EXISTS {errors} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                error TEXT NOT NULL
            );",
            run = tables.run,
            lists = tables.lists,
            files = tables.files,
            errors = tables.errors,
        ))?;

        let fresh: String = serde_json::to_string(&MigrationRun::default())?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (id, version, state) VALUES (?, 0, ?)",
                tables.run
            ),
            params![Self::RUN_ID, fresh],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            tables,
        })
    }

    fn read_run(&self, conn: &Connection) -> Result<MigrationRun, StoreError> {
        let row: Option<(i64, String)> = conn
            .query_row(
                &format!("SELECT version, state FROM {} WHERE id = ?", self.tables.run),
                params![Self::RUN_ID],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, state)) => {
                let mut run: MigrationRun = serde_json::from_str(&state)?;
                run.version = version as u64;
                Ok(run)
            }
            None => Ok(MigrationRun::default()),
        }
    }

    fn append_errors(&self, tx: &Transaction<'_>, errors: &[FileError]) -> Result<(), StoreError> {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (path, error) VALUES (?, ?)",
            self.tables.errors
        ))?;
        for error in errors {
            stmt.execute(params![error.path, error.error])?;
        }
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for SqliteMigrationStore {
    async fn load(&self) -> Result<MigrationRun, StoreError> {
        let conn = self.conn.lock().unwrap();
        self.read_run(&conn)
    }

    async fn compare_and_swap(
        &self,
        run: &MigrationRun,
        expected_version: u64,
        new_errors: &[FileError],
    ) -> Result<bool, StoreError> {
        let state: String = serde_json::to_string(run)?;
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction<'_> = conn.transaction()?;
        let updated: usize = tx.execute(
            &format!(
                "UPDATE {} SET version = ?, state = ? WHERE id = ? AND version = ?",
                self.tables.run
            ),
            params![
                (expected_version + 1) as i64,
                state,
                Self::RUN_ID,
                expected_version as i64
            ],
        )?;
        if updated != 1 {
            return Ok(false);
        }
        self.append_errors(&tx, new_errors)?;
        tx.commit()?;
        Ok(true)
    }

    async fn reset(&self) -> Result<MigrationRun, StoreError> {
        let fresh: String = serde_json::to_string(&MigrationRun::default())?;
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction<'_> = conn.transaction()?;
        tx.execute(
            &format!(
                "UPDATE {} SET version = version + 1, state = ? WHERE id = ?",
                self.tables.run
            ),
            params![fresh, Self::RUN_ID],
        )?;
        tx.execute_batch(&format!(
            "DELETE FROM {}; DELETE FROM {}; DELETE FROM {};",
            self.tables.files, self.tables.lists, self.tables.errors
        ))?;
        let run: MigrationRun = self.read_run(&tx)?;
        tx.commit()?;
        Ok(run)
    }

    async fn save_work_list(&self, files: &[PathBuf]) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction<'_> = conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO {} (total) VALUES (?)", self.tables.lists),
            params![files.len() as i64],
        )?;
        let list_id: i64 = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (list_id, idx, path) VALUES (?, ?, ?)",
                self.tables.files
            ))?;
            for (idx, path) in files.iter().enumerate() {
                let path: &str = path.to_str().ok_or_else(|| {
                    StoreError::Serialization(format!(
                        "path is not valid UTF-8: {}",
                        path.display()
                    ))
                })?;
                stmt.execute(params![list_id, idx as i64, path])?;
            }
        }
        tx.commit()?;
        Ok(list_id as u64)
    }

    async fn work_list_slice(
        &self,
        list_id: u64,
        start: usize,
        len: usize,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT path FROM {} WHERE list_id = ? AND idx >= ? AND idx < ? ORDER BY idx",
            self.tables.files
        ))?;
        let rows = stmt.query_map(
            params![list_id as i64, start as i64, (start + len) as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut paths: Vec<PathBuf> = Vec::with_capacity(len);
        for row in rows {
            paths.push(PathBuf::from(row?));
        }
        Ok(paths)
    }

    async fn discard_work_list(&self, list_id: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx: Transaction<'_> = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE list_id = ?", self.tables.files),
            params![list_id as i64],
        )?;
        tx.execute(
            &format!("DELETE FROM {} WHERE id = ?", self.tables.lists),
            params![list_id as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn error_history(&self) -> Result<Vec<FileError>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT path, error FROM {} ORDER BY seq",
            self.tables.errors
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(FileError {
                path: row.get(0)?,
                error: row.get(1)?,
            })
        })?;

        let mut errors: Vec<FileError> = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;
    use tempfile::tempdir;

    fn uploads(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i: usize| PathBuf::from(format!("/uploads/{}.jpg", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_store_is_ready() {
        let store = SqliteMigrationStore::open_in_memory().unwrap();
        let run = store.load().await.unwrap();
        assert_eq!(run.status, RunStatus::Ready);
        assert_eq!(run.version, 0);
        assert!(store.error_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = SqliteMigrationStore::open_in_memory().unwrap();
        let mut run = store.load().await.unwrap();
        run.status = RunStatus::Running;
        run.work_list = Some(7);
        run.total = 1;

        assert!(store.compare_and_swap(&run, 0, &[]).await.unwrap());
        assert!(!store.compare_and_swap(&run, 0, &[]).await.unwrap());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.work_list, Some(7));
    }

    #[tokio::test]
    async fn test_errors_only_appended_by_winning_write() {
        let store = SqliteMigrationStore::open_in_memory().unwrap();
        let run = store.load().await.unwrap();
        let denied = FileError::new("/uploads/3.jpg", "access denied");
        let missing = FileError::new("/uploads/4.jpg", "file not found");

        assert!(store
            .compare_and_swap(&run, 0, std::slice::from_ref(&denied))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(&run, 0, std::slice::from_ref(&missing))
            .await
            .unwrap());

        assert_eq!(store.error_history().await.unwrap(), vec![denied]);
    }

    #[tokio::test]
    async fn test_work_list_round_trip() {
        let store = SqliteMigrationStore::open_in_memory().unwrap();
        let files = uploads(25);
        let list_id = store.save_work_list(&files).await.unwrap();

        assert_eq!(
            store.work_list_slice(list_id, 10, 10).await.unwrap(),
            files[10..20].to_vec()
        );
        assert_eq!(
            store.work_list_slice(list_id, 20, 10).await.unwrap(),
            files[20..].to_vec()
        );

        let other = store.save_work_list(&files[..2]).await.unwrap();
        assert_ne!(other, list_id);
        store.discard_work_list(other).await.unwrap();
        assert!(store.work_list_slice(other, 0, 2).await.unwrap().is_empty());
        assert_eq!(store.work_list_slice(list_id, 0, 1).await.unwrap(), files[..1].to_vec());
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");
        let files = uploads(25);

        {
            let store = SqliteMigrationStore::open(&db_path).unwrap();
            let list_id = store.save_work_list(&files).await.unwrap();
            let mut run = store.load().await.unwrap();
            run.status = RunStatus::Paused;
            run.work_list = Some(list_id);
            run.cursor = 10;
            run.total = 25;
            let denied = FileError::new("/uploads/3.jpg", "access denied");
            run.record_errors(std::slice::from_ref(&denied), 10);
            assert!(store.compare_and_swap(&run, 0, &[denied]).await.unwrap());
        }

        {
            let store = SqliteMigrationStore::open(&db_path).unwrap();
            let run = store.load().await.unwrap();
            assert_eq!(run.version, 1);
            assert_eq!(run.status, RunStatus::Paused);
            assert_eq!(run.cursor, 10);
            assert_eq!(run.error_count, 1);
            let list_id = run.work_list.unwrap();
            assert_eq!(
                store.work_list_slice(list_id, run.cursor, 10).await.unwrap(),
                files[10..20].to_vec()
            );
            assert_eq!(store.error_history().await.unwrap()[0].error, "access denied");
        }
    }

    #[tokio::test]
    async fn test_reset() {
        let store = SqliteMigrationStore::open_in_memory().unwrap();
        let list_id = store.save_work_list(&uploads(3)).await.unwrap();
        let mut run = store.load().await.unwrap();
        run.status = RunStatus::Finished;
        run.total = 3;
        run.migrated = 2;
        let failure = FileError::new("/uploads/2.jpg", "boom");
        assert!(store.compare_and_swap(&run, 0, &[failure]).await.unwrap());

        let fresh = store.reset().await.unwrap();
        assert_eq!(fresh.version, 2);
        assert_eq!(fresh.status, RunStatus::Ready);
        assert_eq!(fresh.migrated, 0);
        assert!(fresh.needs_enumeration());
        assert!(store.error_history().await.unwrap().is_empty());
        assert!(store.work_list_slice(list_id, 0, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_handles_share_one_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");
        let first = SqliteMigrationStore::open(&db_path).unwrap();
        let second = SqliteMigrationStore::open(&db_path).unwrap();

        let mut run = first.load().await.unwrap();
        run.status = RunStatus::Running;
        assert!(first.compare_and_swap(&run, 0, &[]).await.unwrap());

        run.status = RunStatus::Paused;
        assert!(!second.compare_and_swap(&run, 0, &[]).await.unwrap());
        assert_eq!(second.load().await.unwrap().status, RunStatus::Running);

        let list_id = second.save_work_list(&uploads(2)).await.unwrap();
        assert_eq!(first.work_list_slice(list_id, 0, 5).await.unwrap().len(), 2);
    }
}
