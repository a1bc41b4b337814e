//! Background loop that keeps calling `process_batch` until the run ends.

use std::sync::Arc;
use std::time::Duration;

use s3_offload_common::ProgressCallback;

use crate::controller::MigrationController;
use crate::error::MigrationError;
use crate::snapshot::ProgressSnapshot;

/// Delay between batches when none is configured.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Drives a Running migration to completion, one batch at a time.
///
/// The driver stops when the run completes, when someone pauses or cancels
/// it, or when the progress callback returns `false`. It never starts a run
/// by itself.
pub struct BatchDriver {
    controller: Arc<MigrationController>,
    interval: Duration,
}

impl BatchDriver {
    /// Create a driver with the default interval.
    pub fn new(controller: Arc<MigrationController>) -> Self {
        Self {
            controller,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Set the pause between batches.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run batches until the migration stops.
    ///
    /// # Arguments
    /// * `progress` - Optional callback receiving every snapshot; returning
    ///   `false` stops the driver (the run itself stays Running)
    ///
    /// # Returns
    /// The last snapshot observed.
    ///
    /// # Errors
    /// Returns the first error that is neither a busy lease nor a stopped run.
    pub async fn run(
        &self,
        progress: Option<&dyn ProgressCallback<ProgressSnapshot>>,
    ) -> Result<ProgressSnapshot, MigrationError> {
        loop {
            match self.controller.process_batch().await {
                Ok(snapshot) => {
                    if let Some(cb) = progress {
                        if !cb.on_progress(&snapshot) {
                            log::info!(
                                "Batch driver stopped by caller at {}/{}",
                                snapshot.done,
                                snapshot.total
                            );
                            return Ok(snapshot);
                        }
                    }
                    if snapshot.complete {
                        return Ok(snapshot);
                    }
                }
                Err(MigrationError::BatchInProgress) => {
                    log::debug!("Another caller is processing a batch; waiting");
                }
                Err(MigrationError::NotRunning { status }) => {
                    log::info!("Batch driver stopping: migration is {}", status);
                    return self.controller.status().await;
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
