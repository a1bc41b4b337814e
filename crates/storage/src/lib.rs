//! Storage abstraction for offloading media files.
//!
//! This crate provides the two collaborators the migration controller talks
//! to besides its own state store:
//!
//! - **Object store** - `ObjectStore` uploads and deletes blobs in one bucket.
//!   The AWS SDK implementation lives in `s3-offload-storage-crt`.
//! - **Attachment index** - `AttachmentIndex` resolves a file's identity and
//!   stores the marker proving it was uploaded.
//!
//! Configuration is a single canonical contract, `OffloadSettings`.

pub mod attachment_index;
mod error;
mod traits;
mod types;

pub use attachment_index::{AttachmentIndex, Identity, IndexError, Marker, SqliteAttachmentIndex};
pub use error::StorageError;
pub use traits::ObjectStore;
pub use types::{AwsCredentials, OffloadSettings};
