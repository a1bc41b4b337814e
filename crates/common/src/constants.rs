//! Shared constants used across s3-offload crates.

/// Files attempted per `process_batch` call.
/// Small enough that one batch fits inside a short request timeout.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Number of most recent per-file errors included in a progress snapshot.
pub const DEFAULT_RECENT_ERRORS_LIMIT: usize = 10;

/// Seconds a batch claim stays valid before another caller may reclaim it.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 300;

/// Attempts made by the optimistic update loop before reporting contention.
pub const MAX_STORE_RETRIES: u32 = 16;

/// Default object key prefix, mirroring the uploads directory layout.
pub const DEFAULT_KEY_PREFIX: &str = "uploads";
