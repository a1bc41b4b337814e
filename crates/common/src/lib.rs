//! Shared types and utilities for s3-offload.
//!
//! This crate provides common functionality used across all s3-offload crates:
//! - Path normalization and object key construction
//! - Generic progress callback trait
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod path_utils;
pub mod progress;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    join_object_key, lexical_normalize, relative_posix_path, to_absolute, to_posix_path,
};
pub use progress::{progress_fn, FnProgress, ProgressCallback};
