//! Attachment index recording which files have already been offloaded.
//!
//! The index maps a local file to a stable identity and stores a migration
//! marker (`bucket`, `key`, `url`) against that identity. The controller
//! consults the marker before every upload so a file is never uploaded
//! twice, even across restarts and renames.

mod entry;
mod error;
mod sqlite;

pub use entry::{Identity, Marker};
pub use error::IndexError;
pub use sqlite::SqliteAttachmentIndex;

use std::path::Path;

use async_trait::async_trait;

/// Lookup and persistence of migration markers.
#[async_trait]
pub trait AttachmentIndex: Send + Sync {
    /// Resolve the identity of a local file.
    ///
    /// # Returns
    /// None if the file is not known to the index (for example, it vanished
    /// after enumeration).
    async fn lookup_identity(&self, path: &Path) -> Result<Option<Identity>, IndexError>;

    /// Fetch the marker recorded for an identity.
    async fn get_marker(&self, identity: &Identity) -> Result<Option<Marker>, IndexError>;

    /// Record that an identity has been offloaded.
    async fn set_marker(&self, identity: &Identity, marker: &Marker) -> Result<(), IndexError>;
}
