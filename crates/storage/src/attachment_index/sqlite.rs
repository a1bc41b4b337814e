//! SQLite backend for the attachment index.

use std::fs::Metadata;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::entry::{Identity, Marker};
use super::error::IndexError;
use super::AttachmentIndex;

/// SQLite-based attachment index.
///
/// On Unix a file's identity is its device, inode and modification time.
/// Renames and moves within one filesystem keep the marker, while two files
/// with identical bytes stay distinct. A file rewritten in place gets a new
/// identity and is offloaded again. Elsewhere the identity is the path.
///
/// Markers persist across sessions; WAL mode lets several processes share
/// the database.
pub struct SqliteAttachmentIndex {
    /// Database connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    /// Table name (versioned for schema migrations).
    table_name: String,
}

impl SqliteAttachmentIndex {
    /// Database schema version.
    const INDEX_DB_VERSION: u32 = 1;

    /// Create or open an index at the given path.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self, IndexError> {
        let conn: Connection = Connection::open(db_path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::initialize(conn)
    }

    /// Create an index held entirely in memory.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, IndexError> {
        let table_name: String = format!("attachment_markers_v{}", Self::INDEX_DB_VERSION);

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    identity TEXT PRIMARY KEY,
                    bucket TEXT NOT NULL,
                    object_key TEXT NOT NULL,
                    url TEXT NOT NULL,
                    migrated_at INTEGER NOT NULL
                )",
                table_name
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name,
        })
    }
}

#[async_trait]
impl AttachmentIndex for SqliteAttachmentIndex {
    async fn lookup_identity(&self, path: &Path) -> Result<Option<Identity>, IndexError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(file_identity(path, &metadata))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    async fn get_marker(&self, identity: &Identity) -> Result<Option<Marker>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let marker: Option<Marker> = conn
            .query_row(
                &format!(
                    "SELECT bucket, object_key, url FROM {} WHERE identity = ?",
                    self.table_name
                ),
                params![identity.as_str()],
                |row| {
                    Ok(Marker {
                        bucket: row.get(0)?,
                        key: row.get(1)?,
                        url: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(marker)
    }

    async fn set_marker(&self, identity: &Identity, marker: &Marker) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (identity, bucket, object_key, url, migrated_at)
                 VALUES (?, ?, ?, ?, ?)",
                self.table_name
            ),
            params![
                identity.as_str(),
                marker.bucket,
                marker.key,
                marker.url,
                current_epoch_seconds()
            ],
        )?;
        Ok(())
    }
}

#[cfg(unix)]
fn file_identity(_path: &Path, metadata: &Metadata) -> Identity {
    use std::os::unix::fs::MetadataExt;

    Identity::new(format!(
        "{}:{}:{}.{:09}",
        metadata.dev(),
        metadata.ino(),
        metadata.mtime(),
        metadata.mtime_nsec()
    ))
}

#[cfg(not(unix))]
fn file_identity(path: &Path, _metadata: &Metadata) -> Identity {
    Identity::new(path.display().to_string())
}

/// Get current time as epoch seconds.
fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn marker(key: &str) -> Marker {
        Marker::new("media", key, format!("https://cdn.example.com/{}", key))
    }

    #[tokio::test]
    async fn test_lookup_identity_missing_file() {
        let index = SqliteAttachmentIndex::open_in_memory().unwrap();
        let identity = index
            .lookup_identity(Path::new("/nonexistent/photo.jpg"))
            .await
            .unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn test_lookup_identity_of_directory() {
        let dir = tempdir().unwrap();
        let index = SqliteAttachmentIndex::open_in_memory().unwrap();
        assert!(index.lookup_identity(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_marker() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, b"jpeg").unwrap();
        let index = SqliteAttachmentIndex::open(&dir.path().join("index.db")).unwrap();

        let identity = index.lookup_identity(&file).await.unwrap().unwrap();
        assert!(index.get_marker(&identity).await.unwrap().is_none());

        index
            .set_marker(&identity, &marker("uploads/photo.jpg"))
            .await
            .unwrap();
        assert_eq!(
            index.get_marker(&identity).await.unwrap(),
            Some(marker("uploads/photo.jpg"))
        );
    }

    #[tokio::test]
    async fn test_identical_contents_have_distinct_identities() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        let index = SqliteAttachmentIndex::open_in_memory().unwrap();

        let first = index.lookup_identity(&a).await.unwrap().unwrap();
        let second = index.lookup_identity(&b).await.unwrap().unwrap();
        assert_ne!(first, second);

        index.set_marker(&first, &marker("uploads/a.jpg")).await.unwrap();
        assert!(index.get_marker(&second).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_marker_survives_rename() {
        let dir = tempdir().unwrap();
        let before = dir.path().join("before.jpg");
        let after = dir.path().join("after.jpg");
        std::fs::write(&before, b"jpeg").unwrap();
        let index = SqliteAttachmentIndex::open_in_memory().unwrap();

        let identity = index.lookup_identity(&before).await.unwrap().unwrap();
        index
            .set_marker(&identity, &marker("uploads/before.jpg"))
            .await
            .unwrap();

        std::fs::rename(&before, &after).unwrap();
        let renamed = index.lookup_identity(&after).await.unwrap().unwrap();
        assert_eq!(renamed, identity);
        assert_eq!(
            index.get_marker(&renamed).await.unwrap(),
            Some(marker("uploads/before.jpg"))
        );
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        let identity = Identity::new("2049:131:1714000000.000000000");

        {
            let index = SqliteAttachmentIndex::open(&db_path).unwrap();
            index
                .set_marker(&identity, &marker("uploads/a.jpg"))
                .await
                .unwrap();
        }

        {
            let index = SqliteAttachmentIndex::open(&db_path).unwrap();
            assert_eq!(
                index.get_marker(&identity).await.unwrap(),
                Some(marker("uploads/a.jpg"))
            );
        }
    }
}
