//! File system operations for s3-offload.
//!
//! This crate produces the fixed work list of a migration run:
//! - `GlobFilter` - Include/exclude pattern matching on root-relative paths
//! - `FileEnumerator` - Deterministic listing of every regular file under a root

pub mod enumerator;
pub mod error;
pub mod glob;

// Re-export main types
pub use enumerator::{EnumerateOptions, FileEnumerator, ScanProgress};
pub use error::FileSystemError;
pub use glob::GlobFilter;
