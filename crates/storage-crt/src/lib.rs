//! AWS SDK S3 backend for s3-offload.
//!
//! This crate provides an `ObjectStore` implementation using the AWS SDK for
//! Rust. It works against AWS S3 and S3-compatible services reachable
//! through a custom endpoint.
//!
//! # Example
//!
//! ```ignore
//! use s3_offload_storage::OffloadSettings;
//! use s3_offload_storage_crt::S3ObjectStore;
//!
//! let settings = OffloadSettings::new("my-media-bucket", "eu-west-1");
//! let store = S3ObjectStore::new(settings).await?;
//! ```

mod client;
mod error;

pub use client::S3ObjectStore;
pub use error::CrtError;
