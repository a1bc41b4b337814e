//! Migration controller settings.

use std::path::PathBuf;
use std::time::Duration;

use s3_offload_common::{
    DEFAULT_BATCH_SIZE, DEFAULT_KEY_PREFIX, DEFAULT_LEASE_TTL_SECS, DEFAULT_RECENT_ERRORS_LIMIT,
};
use s3_offload_filesystem::GlobFilter;

/// Shortest batch lease accepted. The holder renews at a third of the TTL,
/// so anything shorter leaves no room for a store round trip.
pub const MIN_LEASE_TTL: Duration = Duration::from_millis(100);

/// Tunables for a migration run.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Uploads root; object keys are paths relative to it.
    pub root: PathBuf,
    /// Prefix prepended to every object key.
    pub key_prefix: String,
    /// Files attempted per `process_batch` call.
    pub batch_size: usize,
    /// Errors included in a progress snapshot.
    pub recent_errors_limit: usize,
    /// How long a batch claim stays valid.
    pub lease_ttl: Duration,
    /// Filter applied when building the work list.
    pub filter: GlobFilter,
}

impl MigrationSettings {
    /// Create settings for an uploads root with defaults everywhere else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            recent_errors_limit: DEFAULT_RECENT_ERRORS_LIMIT,
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            filter: GlobFilter::default(),
        }
    }

    /// Set the object key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the batch size. Zero is raised to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set how many recent errors snapshots carry.
    pub fn with_recent_errors_limit(mut self, limit: usize) -> Self {
        self.recent_errors_limit = limit;
        self
    }

    /// Set the batch lease lifetime. Values below [`MIN_LEASE_TTL`],
    /// including zero, are raised to it.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl.max(MIN_LEASE_TTL);
        self
    }

    /// Set the enumeration filter.
    pub fn with_filter(mut self, filter: GlobFilter) -> Self {
        self.filter = filter;
        self
    }
}
