//! Object store interface consumed by the migration controller.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

/// Uploads and deletes blobs in a single bucket.
///
/// Implementations must tolerate repeated uploads to the same key; an
/// upload overwrites whatever the key held before.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store writes to.
    fn bucket(&self) -> &str;

    /// Upload a local file under `key`.
    ///
    /// # Arguments
    /// * `path` - Local file to read
    /// * `key` - Destination object key
    ///
    /// # Returns
    /// The key the object was stored under.
    async fn upload(&self, path: &Path, key: &str) -> Result<String, StorageError>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL for an object key.
    fn url_for(&self, key: &str) -> String;
}
