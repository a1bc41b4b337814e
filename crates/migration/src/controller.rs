//! Migration controller: the run state machine and batch processing.
//!
//! A run moves through `Ready -> Running -> (Paused <-> Running) -> Finished`,
//! with `Cancelled` and `Error` as the other terminal states. Work happens
//! in bounded batches driven from outside (an HTTP poller, the CLI driver),
//! so one call never runs for long and a crash loses at most one batch.
//!
//! Each batch:
//! 1. Enumerates the uploads root on first use and stores the work list
//! 2. Claims the next slice of the list with a lease
//! 3. For every file, skips it if the attachment index already holds a
//!    marker, otherwise uploads it and records the marker
//! 4. Commits the counters and advances the cursor, if the lease still holds
//!
//! While files are being processed a heartbeat keeps pushing the lease
//! expiry forward. No file is started once the lease has lapsed or been
//! taken away. Per-file failures are recorded and never abort the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use s3_offload_common::{join_object_key, relative_posix_path, PathError, MAX_STORE_RETRIES};
use s3_offload_filesystem::{EnumerateOptions, FileEnumerator};
use s3_offload_storage::{AttachmentIndex, Identity, Marker, ObjectStore};

use crate::error::MigrationError;
use crate::run::{BatchLease, FileError, MigrationRun, RunStatus};
use crate::settings::MigrationSettings;
use crate::snapshot::ProgressSnapshot;
use crate::store::{MigrationStore, StoreError};

/// Shortest pause between lease renewals.
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Result of attempting one file.
#[derive(Debug, PartialEq, Eq)]
enum FileOutcome {
    Migrated,
    Skipped,
    Failed(String),
}

/// Counters gathered while processing one batch.
#[derive(Debug, Default)]
struct BatchOutcome {
    migrated: usize,
    skipped: usize,
    errors: Vec<FileError>,
}

impl BatchOutcome {
    fn attempted(&self) -> usize {
        self.migrated + self.skipped + self.errors.len()
    }
}

/// The batch loop's view of its own lease, kept current by the heartbeat.
struct LeaseHold {
    lost: AtomicBool,
    expires_at_ms: AtomicI64,
}

impl LeaseHold {
    fn new(lease: &BatchLease) -> Self {
        Self {
            lost: AtomicBool::new(false),
            expires_at_ms: AtomicI64::new(lease.expires_at_ms),
        }
    }

    /// Whether another file may be started at `now_ms`.
    fn is_held(&self, now_ms: i64) -> bool {
        !self.lost.load(Ordering::SeqCst) && now_ms < self.expires_at_ms.load(Ordering::SeqCst)
    }
}

/// Drives a single migration run.
///
/// All state lives in the [`MigrationStore`]; the controller itself holds
/// only collaborators and settings, so any number of controllers (in one or
/// many processes) may share one store.
pub struct MigrationController {
    store: Arc<dyn MigrationStore>,
    objects: Arc<dyn ObjectStore>,
    index: Arc<dyn AttachmentIndex>,
    enumerator: FileEnumerator,
    settings: MigrationSettings,
}

impl MigrationController {
    /// Create a controller.
    ///
    /// # Arguments
    /// * `store` - Where the run record lives
    /// * `objects` - Destination bucket
    /// * `index` - Marker lookup and persistence
    /// * `settings` - Root, batch size and other tunables
    pub fn new(
        store: Arc<dyn MigrationStore>,
        objects: Arc<dyn ObjectStore>,
        index: Arc<dyn AttachmentIndex>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            store,
            objects,
            index,
            enumerator: FileEnumerator::new(),
            settings,
        }
    }

    /// Start the run, optionally from scratch.
    ///
    /// Starting a Running run is a no-op, even with `reset`. A Paused run
    /// continues where it stopped. Terminal runs only start with `reset`.
    ///
    /// # Errors
    /// Returns `InvalidTransition` for a terminal run without `reset`.
    pub async fn start(&self, reset: bool) -> Result<ProgressSnapshot, MigrationError> {
        let now: i64 = current_epoch_seconds();
        let (run, started) = self
            .mutate(|run: &mut MigrationRun| {
                if run.status == RunStatus::Running {
                    return Ok(false);
                }
                if reset {
                    run.reset();
                }
                if run.status.is_terminal() {
                    return Err(MigrationError::InvalidTransition {
                        action: "start",
                        status: run.status,
                    });
                }
                run.status = RunStatus::Running;
                run.started_at.get_or_insert(now);
                run.last_error = None;
                Ok(true)
            })
            .await?;

        if started {
            log::info!(
                "Migration started (reset={}, cursor {}/{})",
                reset,
                run.cursor,
                run.total
            );
        }
        Ok(self.snapshot(&run))
    }

    /// Continue a Paused run. Same as `start(false)`.
    pub async fn resume(&self) -> Result<ProgressSnapshot, MigrationError> {
        self.start(false).await
    }

    /// Pause a Running run. Any other state is left unchanged.
    ///
    /// A batch already in flight still commits its results.
    pub async fn pause(&self) -> Result<ProgressSnapshot, MigrationError> {
        let (run, paused) = self
            .mutate(|run: &mut MigrationRun| {
                if run.status != RunStatus::Running {
                    return Ok(false);
                }
                run.status = RunStatus::Paused;
                Ok(true)
            })
            .await?;

        if paused {
            log::info!("Migration paused at {}/{}", run.cursor, run.total);
        }
        Ok(self.snapshot(&run))
    }

    /// Cancel a Running or Paused run, keeping its progress for inspection.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from Ready, Finished or Error.
    pub async fn cancel(&self) -> Result<ProgressSnapshot, MigrationError> {
        let (run, cancelled) = self
            .mutate(|run: &mut MigrationRun| match run.status {
                RunStatus::Running | RunStatus::Paused => {
                    run.status = RunStatus::Cancelled;
                    Ok(true)
                }
                RunStatus::Cancelled => Ok(false),
                status => Err(MigrationError::InvalidTransition {
                    action: "cancel",
                    status,
                }),
            })
            .await?;

        if cancelled {
            log::info!("Migration cancelled at {}/{}", run.cursor, run.total);
        }
        Ok(self.snapshot(&run))
    }

    /// Discard the run from any state and return to Ready.
    ///
    /// Markers in the attachment index are kept, so a new run skips every
    /// file already offloaded.
    pub async fn reset(&self) -> Result<ProgressSnapshot, MigrationError> {
        let run: MigrationRun = self.store.reset().await?;
        log::info!("Migration reset");
        Ok(self.snapshot(&run))
    }

    /// Read the current progress without changing anything.
    pub async fn status(&self) -> Result<ProgressSnapshot, MigrationError> {
        let run: MigrationRun = self.store.load().await?;
        Ok(self.snapshot(&run))
    }

    /// Every per-file error of the current run, oldest first.
    pub async fn error_history(&self) -> Result<Vec<FileError>, MigrationError> {
        Ok(self.store.error_history().await?)
    }

    /// Process the next batch of files.
    ///
    /// # Returns
    /// A snapshot taken after the batch committed. When the root holds no
    /// files the snapshot is `complete` with the run back in Ready.
    ///
    /// # Errors
    /// - `NotRunning` if the run is not Running
    /// - `BatchInProgress` if another caller holds an unexpired lease
    /// - `EnumerationFailed` if the root cannot be walked (run moves to Error)
    /// - `Store` if the state store fails or stays contended
    pub async fn process_batch(&self) -> Result<ProgressSnapshot, MigrationError> {
        let run: MigrationRun = self.store.load().await?;
        if run.status != RunStatus::Running {
            return Err(MigrationError::NotRunning { status: run.status });
        }
        if run.active_lease(current_epoch_millis()).is_some() {
            return Err(MigrationError::BatchInProgress);
        }

        if run.needs_enumeration() {
            if let Some(snapshot) = self.prepare_work_list().await? {
                return Ok(snapshot);
            }
        }

        let (run, claim) = self.claim_batch().await?;
        let (lease, list_id) = match claim {
            Some(claim) => claim,
            None => return Ok(self.snapshot(&run)),
        };

        let paths: Vec<PathBuf> = self
            .store
            .work_list_slice(list_id, lease.start, lease.len)
            .await?;
        if paths.len() != lease.len {
            return self.abandon_batch(&lease, list_id, paths.len()).await;
        }

        log::debug!(
            "Processing batch {} (files {}..{} of {})",
            lease.id,
            lease.start,
            lease.start + lease.len,
            run.total
        );

        let outcome: BatchOutcome = self.process_leased(&lease, &paths).await;
        let run: MigrationRun = self.commit_batch(&lease, list_id, &outcome).await?;
        Ok(self.snapshot(&run))
    }

    /// Enumerate the root and store the work list.
    ///
    /// # Returns
    /// `Some(snapshot)` when there is nothing to migrate, `None` once the
    /// work list is in place.
    async fn prepare_work_list(&self) -> Result<Option<ProgressSnapshot>, MigrationError> {
        let options: EnumerateOptions = EnumerateOptions::new(self.settings.root.clone())
            .with_filter(self.settings.filter.clone());
        let enumerator: FileEnumerator = self.enumerator;

        let listed: Result<Vec<PathBuf>, String> =
            match tokio::task::spawn_blocking(move || enumerator.enumerate(&options, None)).await
            {
                Ok(Ok(files)) => Ok(files),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("enumeration task failed: {}", e)),
            };

        let files: Vec<PathBuf> = match listed {
            Ok(files) => files,
            Err(message) => {
                log::error!(
                    "Failed to enumerate {}: {}",
                    self.settings.root.display(),
                    message
                );
                self.mutate(|run: &mut MigrationRun| {
                    if run.status == RunStatus::Running && run.needs_enumeration() {
                        run.status = RunStatus::Error;
                        run.last_error = Some(message.clone());
                    }
                    Ok(())
                })
                .await?;
                return Err(MigrationError::EnumerationFailed { message });
            }
        };

        if files.is_empty() {
            log::info!(
                "Nothing to migrate under {}",
                self.settings.root.display()
            );
            let (run, _) = self
                .mutate(|run: &mut MigrationRun| {
                    if run.status == RunStatus::Running && run.needs_enumeration() {
                        run.status = RunStatus::Ready;
                        run.started_at = None;
                    }
                    Ok(())
                })
                .await?;
            return Ok(Some(ProgressSnapshot::nothing_to_migrate(&run)));
        }

        let total: usize = files.len();
        let list_id: u64 = self.store.save_work_list(&files).await?;
        let (_, installed) = self
            .mutate(|run: &mut MigrationRun| {
                if matches!(run.status, RunStatus::Running | RunStatus::Paused)
                    && run.needs_enumeration()
                {
                    run.work_list = Some(list_id);
                    run.total = total;
                    return Ok(true);
                }
                Ok(false)
            })
            .await?;

        if installed {
            log::info!("Work list ready: {} files", total);
        } else {
            log::debug!("Another caller stored the work list first; dropping list {}", list_id);
            self.store.discard_work_list(list_id).await?;
        }
        Ok(None)
    }

    /// Lease the next slice of the work list.
    ///
    /// # Returns
    /// The run as saved, plus the lease and work list id when there is a
    /// slice left to process.
    async fn claim_batch(
        &self,
    ) -> Result<(MigrationRun, Option<(BatchLease, u64)>), MigrationError> {
        let now_ms: i64 = current_epoch_millis();
        let ttl_ms: i64 = self.settings.lease_ttl.as_millis() as i64;
        let batch_size: usize = self.settings.batch_size;
        let mut released: Option<u64> = None;

        let (run, claim) = self
            .mutate(|run: &mut MigrationRun| {
                released = None;
                if run.status != RunStatus::Running {
                    return Err(MigrationError::NotRunning { status: run.status });
                }
                if run.active_lease(now_ms).is_some() {
                    return Err(MigrationError::BatchInProgress);
                }
                if let Some(stale) = &run.lease {
                    log::warn!(
                        "Reclaiming expired batch lease {} (files {}..{})",
                        stale.id,
                        stale.start,
                        stale.start + stale.len
                    );
                    run.lease = None;
                }
                if run.needs_enumeration() {
                    return Ok(None);
                }

                let len: usize = batch_size.min(run.remaining());
                if len == 0 {
                    released = run.work_list;
                    run.finish(now_ms / 1000);
                    return Ok(None);
                }
                let list_id: u64 = run.work_list.ok_or_else(|| {
                    StoreError::Serialization(format!(
                        "run has {} files left but no work list",
                        run.remaining()
                    ))
                })?;

                let lease: BatchLease = BatchLease {
                    id: run.version + 1,
                    start: run.cursor,
                    len,
                    expires_at_ms: now_ms + ttl_ms,
                };
                run.lease = Some(lease.clone());
                Ok(Some((lease, list_id)))
            })
            .await?;

        if let Some(list_id) = released {
            self.release_work_list(list_id).await;
        }
        Ok((run, claim))
    }

    /// Process `paths` under `lease`, renewing it until the files are done
    /// or the lease is lost.
    async fn process_leased(&self, lease: &BatchLease, paths: &[PathBuf]) -> BatchOutcome {
        let hold: LeaseHold = LeaseHold::new(lease);
        let work = self.process_files(lease, paths, &hold);
        tokio::pin!(work);

        tokio::select! {
            outcome = &mut work => outcome,
            () = self.keep_lease_alive(lease, &hold) => work.await,
        }
    }

    async fn process_files(
        &self,
        lease: &BatchLease,
        paths: &[PathBuf],
        hold: &LeaseHold,
    ) -> BatchOutcome {
        let mut outcome: BatchOutcome = BatchOutcome::default();
        for path in paths {
            if !hold.is_held(current_epoch_millis()) {
                log::warn!(
                    "Batch lease {} lapsed after {} of {} files; leaving the rest",
                    lease.id,
                    outcome.attempted(),
                    paths.len()
                );
                break;
            }
            match self.migrate_file(path).await {
                FileOutcome::Migrated => outcome.migrated += 1,
                FileOutcome::Skipped => outcome.skipped += 1,
                FileOutcome::Failed(message) => {
                    log::warn!("Failed to migrate {}: {}", path.display(), message);
                    outcome
                        .errors
                        .push(FileError::new(path.display().to_string(), message));
                }
            }
        }
        outcome
    }

    /// Renew `lease` every third of its TTL. Returns only once the lease has
    /// been lost.
    async fn keep_lease_alive(&self, lease: &BatchLease, hold: &LeaseHold) {
        let interval: Duration = (self.settings.lease_ttl / 3).max(MIN_RENEW_INTERVAL);
        loop {
            tokio::time::sleep(interval).await;
            match self.renew_lease(lease).await {
                Ok(expires_at_ms) => hold.expires_at_ms.store(expires_at_ms, Ordering::SeqCst),
                Err(MigrationError::LeaseLost { .. }) => {
                    log::warn!("Batch lease {} was taken away; stopping the batch", lease.id);
                    hold.lost.store(true, Ordering::SeqCst);
                    return;
                }
                Err(e) => log::warn!("Could not renew batch lease {}: {}", lease.id, e),
            }
        }
    }

    /// Push the expiry of `lease` one TTL into the future.
    ///
    /// # Errors
    /// Returns `LeaseLost` if the run no longer carries the lease.
    async fn renew_lease(&self, lease: &BatchLease) -> Result<i64, MigrationError> {
        let ttl_ms: i64 = self.settings.lease_ttl.as_millis() as i64;
        let (_, expires_at_ms) = self
            .mutate(|run: &mut MigrationRun| {
                if !run.holds(lease) {
                    return Err(MigrationError::LeaseLost { id: lease.id });
                }
                let expires_at_ms: i64 = current_epoch_millis() + ttl_ms;
                if let Some(held) = run.lease.as_mut() {
                    held.expires_at_ms = expires_at_ms;
                }
                Ok(expires_at_ms)
            })
            .await?;
        Ok(expires_at_ms)
    }

    /// Fold a batch's results into the run if our lease is still current.
    async fn commit_batch(
        &self,
        lease: &BatchLease,
        list_id: u64,
        outcome: &BatchOutcome,
    ) -> Result<MigrationRun, MigrationError> {
        let now: i64 = current_epoch_seconds();
        let keep: usize = self.settings.recent_errors_limit;
        let committed = self
            .mutate_appending(&outcome.errors, |run: &mut MigrationRun| {
                if !run.holds(lease) {
                    return Err(MigrationError::LeaseLost { id: lease.id });
                }

                run.lease = None;
                run.cursor = (run.cursor + outcome.attempted()).min(run.total);
                run.migrated += outcome.migrated;
                run.skipped += outcome.skipped;
                run.record_errors(&outcome.errors, keep);

                if run.cursor >= run.total {
                    run.finish(now);
                }
                Ok(())
            })
            .await;

        let run: MigrationRun = match committed {
            Ok((run, ())) => run,
            Err(MigrationError::LeaseLost { id }) => {
                log::warn!(
                    "Batch lease {} was lost before commit; discarding its counters",
                    id
                );
                return Ok(self.store.load().await?);
            }
            Err(e) => return Err(e),
        };

        log::info!(
            "Batch committed: {}/{} files ({} migrated, {} skipped, {} failed)",
            run.cursor,
            run.total,
            outcome.migrated,
            outcome.skipped,
            outcome.errors.len()
        );
        if run.status == RunStatus::Finished {
            log::info!(
                "Migration finished: {} migrated, {} skipped, {} failed",
                run.migrated,
                run.skipped,
                run.error_count
            );
            self.release_work_list(list_id).await;
        }
        Ok(run)
    }

    /// Stop the run when the stored work list is shorter than the lease.
    async fn abandon_batch(
        &self,
        lease: &BatchLease,
        list_id: u64,
        found: usize,
    ) -> Result<ProgressSnapshot, MigrationError> {
        let message: String = format!(
            "work list {} is missing entries {}..{} ({} of {} found)",
            list_id,
            lease.start,
            lease.start + lease.len,
            found,
            lease.len
        );
        let stopped = self
            .mutate(|run: &mut MigrationRun| {
                if !run.holds(lease) {
                    return Err(MigrationError::LeaseLost { id: lease.id });
                }
                run.status = RunStatus::Error;
                run.last_error = Some(message.clone());
                run.lease = None;
                Ok(())
            })
            .await;

        match stopped {
            Ok(_) => {
                log::error!("Migration stopped: {}", message);
                Err(StoreError::Serialization(message).into())
            }
            // A reset dropped the list underneath us.
            Err(MigrationError::LeaseLost { .. }) => self.status().await,
            Err(e) => Err(e),
        }
    }

    async fn release_work_list(&self, list_id: u64) {
        if let Err(e) = self.store.discard_work_list(list_id).await {
            log::warn!("Could not release work list {}: {}", list_id, e);
        }
    }

    /// Offload one file.
    async fn migrate_file(&self, path: &Path) -> FileOutcome {
        let identity: Identity = match self.index.lookup_identity(path).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return FileOutcome::Failed("file not found".to_string()),
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        match self.index.get_marker(&identity).await {
            Ok(Some(_)) => return FileOutcome::Skipped,
            Ok(None) => {}
            Err(e) => return FileOutcome::Failed(e.to_string()),
        }

        let key: String = match self.object_key(path) {
            Ok(key) => key,
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        let stored_key: String = match self.objects.upload(path, &key).await {
            Ok(stored_key) => stored_key,
            Err(e) if e.is_retryable() => {
                return FileOutcome::Failed(format!("{} (retryable; reset to try again)", e))
            }
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        let marker: Marker = Marker::new(
            self.objects.bucket(),
            stored_key.as_str(),
            self.objects.url_for(&stored_key),
        );
        if let Err(e) = self.index.set_marker(&identity, &marker).await {
            if let Err(delete_err) = self.objects.delete(&stored_key).await {
                log::warn!(
                    "Could not remove orphaned object {}: {}",
                    stored_key,
                    delete_err
                );
            }
            return FileOutcome::Failed(format!("uploaded but marker not recorded: {}", e));
        }

        log::debug!("Migrated {} to {}", path.display(), stored_key);
        FileOutcome::Migrated
    }

    /// Object key of a file: the key prefix joined with its root-relative path.
    fn object_key(&self, path: &Path) -> Result<String, PathError> {
        let relative: String = relative_posix_path(path, &self.settings.root)?;
        Ok(join_object_key(&self.settings.key_prefix, &relative))
    }

    fn snapshot(&self, run: &MigrationRun) -> ProgressSnapshot {
        ProgressSnapshot::from_run(
            run,
            self.settings.recent_errors_limit,
            current_epoch_millis(),
        )
    }

    /// Apply `change` to the stored run with optimistic concurrency.
    async fn mutate<T, F>(&self, change: F) -> Result<(MigrationRun, T), MigrationError>
    where
        F: FnMut(&mut MigrationRun) -> Result<T, MigrationError>,
    {
        self.mutate_appending(&[], change).await
    }

    /// Apply `change` to the stored run with optimistic concurrency, adding
    /// `new_errors` to the error history in the same write.
    ///
    /// The run is reloaded and `change` re-applied whenever another writer
    /// saved first. An error from `change` aborts without writing.
    ///
    /// # Returns
    /// The run as saved, and whatever `change` returned.
    async fn mutate_appending<T, F>(
        &self,
        new_errors: &[FileError],
        mut change: F,
    ) -> Result<(MigrationRun, T), MigrationError>
    where
        F: FnMut(&mut MigrationRun) -> Result<T, MigrationError>,
    {
        for attempt in 1..=MAX_STORE_RETRIES {
            let mut run: MigrationRun = self.store.load().await?;
            let expected_version: u64 = run.version;
            let value: T = change(&mut run)?;

            if self
                .store
                .compare_and_swap(&run, expected_version, new_errors)
                .await?
            {
                run.version = expected_version + 1;
                return Ok((run, value));
            }
            log::debug!(
                "Migration record changed underneath us (attempt {}/{})",
                attempt,
                MAX_STORE_RETRIES
            );
        }

        Err(StoreError::Contention {
            attempts: MAX_STORE_RETRIES,
        }
        .into())
    }
}

/// Get current time as epoch seconds.
fn current_epoch_seconds() -> i64 {
    current_epoch_millis() / 1000
}

/// Get current time as epoch milliseconds.
fn current_epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
