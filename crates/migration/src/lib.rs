//! Resumable migration of existing uploads to object storage.
//!
//! This crate owns the migration run:
//!
//! - **Controller** - `MigrationController` runs the state machine and
//!   processes the work list in bounded, leased batches.
//! - **State store** - `MigrationStore` persists the single run record with
//!   optimistic concurrency (`SqliteMigrationStore`, `MemoryMigrationStore`).
//! - **Status API** - `StatusApi` authorizes JSON requests and maps them
//!   onto controller operations.
//! - **Driver** - `BatchDriver` calls `process_batch` on an interval until
//!   the run ends.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use s3_offload_migration::{BatchDriver, MigrationController, MigrationSettings, SqliteMigrationStore};
//!
//! let controller = Arc::new(MigrationController::new(
//!     Arc::new(SqliteMigrationStore::open(&state_db)?),
//!     Arc::new(object_store),
//!     Arc::new(attachment_index),
//!     MigrationSettings::new("/var/www/uploads"),
//! ));
//! controller.start(false).await?;
//! let snapshot = BatchDriver::new(controller).run(None).await?;
//! ```

pub mod api;
mod controller;
mod driver;
mod error;
mod run;
mod settings;
mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{
    ApiAction, ApiData, ApiFailure, ApiRequest, ApiResponse, Authorizer, RequestContext,
    StatusApi, TokenAuthorizer, MANAGE_CAPABILITY,
};
pub use controller::MigrationController;
pub use driver::BatchDriver;
pub use error::MigrationError;
pub use run::{BatchLease, FileError, MigrationRun, RunStatus};
pub use settings::{MigrationSettings, MIN_LEASE_TTL};
pub use snapshot::{ProgressSnapshot, NOTHING_TO_MIGRATE};
pub use store::{MemoryMigrationStore, MigrationStore, SqliteMigrationStore, StoreError};
