//! In-process object store and attachment index used by the controller tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use s3_offload_storage::{AttachmentIndex, Identity, IndexError, Marker, ObjectStore, StorageError};

/// Object store that records uploads instead of sending them anywhere.
#[derive(Default)]
pub(crate) struct FakeObjectStore {
    uploads: Mutex<HashMap<String, usize>>,
    deleted: Mutex<Vec<String>>,
    failing_names: Mutex<HashSet<String>>,
    delay: Duration,
}

impl FakeObjectStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every upload so concurrent callers interleave.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make uploads of files with this file name fail.
    pub(crate) fn fail_uploads_of(&self, file_name: &str) {
        self.failing_names
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub(crate) fn upload_counts(&self) -> HashMap<String, usize> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn total_uploads(&self) -> usize {
        self.uploads.lock().unwrap().values().sum()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    fn bucket(&self) -> &str {
        "media"
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, StorageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !path.is_file() {
            return Err(StorageError::IoError {
                path: path.display().to_string(),
                message: "No such file or directory".into(),
            });
        }
        let name: String = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing_names.lock().unwrap().contains(&name) {
            return Err(StorageError::AccessDenied {
                bucket: "media".into(),
                key: key.into(),
                message: "denied by test".into(),
            });
        }
        *self
            .uploads
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("https://cdn.example.com/{}", key)
    }
}

/// Attachment index keyed by path, so identical contents stay distinct.
#[derive(Default)]
pub(crate) struct FakeAttachmentIndex {
    markers: Mutex<HashMap<Identity, Marker>>,
    fail_set_marker: AtomicBool,
}

impl FakeAttachmentIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn identity_of(path: &Path) -> Identity {
        Identity::new(path.display().to_string())
    }

    pub(crate) fn seed_marker(&self, path: &Path) {
        self.markers.lock().unwrap().insert(
            Self::identity_of(path),
            Marker::new("media", "seeded", "https://cdn.example.com/seeded"),
        );
    }

    pub(crate) fn fail_set_marker(&self, fail: bool) {
        self.fail_set_marker.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn has_marker(&self, path: &Path) -> bool {
        self.markers
            .lock()
            .unwrap()
            .contains_key(&Self::identity_of(path))
    }

    pub(crate) fn marker_count(&self) -> usize {
        self.markers.lock().unwrap().len()
    }
}

#[async_trait]
impl AttachmentIndex for FakeAttachmentIndex {
    async fn lookup_identity(&self, path: &Path) -> Result<Option<Identity>, IndexError> {
        if path.is_file() {
            Ok(Some(Self::identity_of(path)))
        } else {
            Ok(None)
        }
    }

    async fn get_marker(&self, identity: &Identity) -> Result<Option<Marker>, IndexError> {
        Ok(self.markers.lock().unwrap().get(identity).cloned())
    }

    async fn set_marker(&self, identity: &Identity, marker: &Marker) -> Result<(), IndexError> {
        if self.fail_set_marker.load(Ordering::SeqCst) {
            return Err(IndexError::Sqlite("database is locked".into()));
        }
        self.markers
            .lock()
            .unwrap()
            .insert(identity.clone(), marker.clone());
        Ok(())
    }
}

/// Write `count` files named `file{NN}.jpg` under `root/media`.
pub(crate) fn write_uploads(root: &Path, count: usize) -> Vec<PathBuf> {
    let dir: PathBuf = root.join("media");
    std::fs::create_dir_all(&dir).unwrap();
    (0..count)
        .map(|i: usize| {
            let path: PathBuf = dir.join(format!("file{:02}.jpg", i));
            std::fs::write(&path, format!("image {}", i)).unwrap();
            path
        })
        .collect()
}
