//! `s3-offload`: migrate an existing uploads directory to S3.
//!
//! Every subcommand operates on the run stored in `--state-db`, so several
//! invocations (or a cron job and an operator) cooperate on one migration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use s3_offload_common::progress_fn;
use s3_offload_filesystem::GlobFilter;
use s3_offload_migration::{
    BatchDriver, FileError, MigrationController, MigrationSettings, ProgressSnapshot,
    SqliteMigrationStore,
};
use s3_offload_storage::{AwsCredentials, OffloadSettings, SqliteAttachmentIndex};
use s3_offload_storage_crt::S3ObjectStore;

#[derive(Parser)]
#[command(name = "s3-offload", about = "Offload an uploads directory to S3")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct Config {
    /// Uploads root to migrate
    #[arg(long, env = "S3_OFFLOAD_ROOT", value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Migration state database
    #[arg(
        long,
        env = "S3_OFFLOAD_STATE_DB",
        value_name = "PATH",
        default_value = "s3-offload-state.sqlite3",
        global = true
    )]
    state_db: PathBuf,

    /// Attachment marker database
    #[arg(
        long,
        env = "S3_OFFLOAD_INDEX_DB",
        value_name = "PATH",
        default_value = "s3-offload-index.sqlite3",
        global = true
    )]
    index_db: PathBuf,

    /// Destination bucket
    #[arg(long, env = "S3_OFFLOAD_BUCKET", global = true)]
    bucket: Option<String>,

    /// Bucket region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", global = true)]
    region: String,

    /// Key prefix for uploaded objects
    #[arg(long, env = "S3_OFFLOAD_PREFIX", default_value = s3_offload_common::DEFAULT_KEY_PREFIX, global = true)]
    prefix: String,

    /// S3-compatible endpoint URL
    #[arg(long, env = "S3_OFFLOAD_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Base URL for public links (e.g. a CDN)
    #[arg(long, env = "S3_OFFLOAD_PUBLIC_URL", global = true)]
    public_url_base: Option<String>,

    /// Static access key; the default AWS provider chain is used otherwise
    #[arg(long, env = "S3_OFFLOAD_ACCESS_KEY_ID", global = true, requires = "secret_access_key")]
    access_key_id: Option<String>,

    /// Static secret key
    #[arg(long, env = "S3_OFFLOAD_SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    secret_access_key: Option<String>,

    /// Files per batch
    #[arg(long, env = "S3_OFFLOAD_BATCH_SIZE", default_value_t = s3_offload_common::DEFAULT_BATCH_SIZE, global = true)]
    batch_size: usize,

    /// Seconds a batch claim stays valid without renewal
    #[arg(
        long,
        env = "S3_OFFLOAD_LEASE_TTL",
        value_name = "SECS",
        default_value_t = s3_offload_common::DEFAULT_LEASE_TTL_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    lease_ttl_secs: u64,

    /// Errors included in each progress report
    #[arg(long, default_value_t = s3_offload_common::DEFAULT_RECENT_ERRORS_LIMIT, global = true)]
    recent_errors: usize,

    /// Glob of root-relative paths to leave out (repeatable)
    #[arg(long, value_name = "GLOB", global = true)]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Start the migration
    Start {
        /// Discard the previous run first
        #[arg(long)]
        reset: bool,
    },
    /// Pause a running migration
    Pause,
    /// Resume a paused migration
    Resume,
    /// Cancel the migration, keeping its progress for inspection
    Cancel,
    /// Discard the run and return to ready
    Reset,
    /// Show current progress
    Status,
    /// List every per-file error of the current run
    Errors,
    /// Process a single batch
    Batch,
    /// Start (if needed) and process batches until the migration ends
    Run {
        /// Discard the previous run first
        #[arg(long)]
        reset: bool,
        /// Milliseconds between batches
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli: Cli = Cli::parse();
    let controller: Arc<MigrationController> = Arc::new(build_controller(&cli.config).await?);

    let snapshot: ProgressSnapshot = match cli.cmd {
        Cmd::Start { reset } => controller.start(reset).await?,
        Cmd::Pause => controller.pause().await?,
        Cmd::Resume => controller.resume().await?,
        Cmd::Cancel => controller.cancel().await?,
        Cmd::Reset => controller.reset().await?,
        Cmd::Status => controller.status().await?,
        Cmd::Batch => controller.process_batch().await?,
        Cmd::Errors => {
            let errors: Vec<FileError> = controller.error_history().await?;
            println!("{}", serde_json::to_string_pretty(&errors)?);
            return Ok(());
        }
        Cmd::Run { reset, interval_ms } => {
            controller.start(reset).await?;
            let report = progress_fn(|s: &ProgressSnapshot| {
                log::info!("{} ({}%)", s.message, s.percent_complete);
                true
            });
            BatchDriver::new(controller.clone())
                .with_interval(Duration::from_millis(interval_ms))
                .run(Some(&report))
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn build_controller(config: &Config) -> Result<MigrationController> {
    let root: PathBuf = config
        .root
        .clone()
        .context("--root (or S3_OFFLOAD_ROOT) is required")?;
    let bucket: String = config
        .bucket
        .clone()
        .context("--bucket (or S3_OFFLOAD_BUCKET) is required")?;

    let mut offload: OffloadSettings =
        OffloadSettings::new(bucket, config.region.clone()).with_prefix(config.prefix.clone());
    if let Some(endpoint) = &config.endpoint {
        offload = offload.with_endpoint(endpoint.clone());
    }
    if let Some(base) = &config.public_url_base {
        offload = offload.with_public_url_base(base.clone());
    }
    if let (Some(access_key_id), Some(secret_access_key)) =
        (&config.access_key_id, &config.secret_access_key)
    {
        offload = offload.with_credentials(AwsCredentials {
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
            session_token: None,
        });
    }

    let filter: GlobFilter =
        GlobFilter::exclude(config.exclude.clone()).context("invalid --exclude pattern")?;
    let settings: MigrationSettings = MigrationSettings::new(root)
        .with_key_prefix(offload.prefix.clone())
        .with_batch_size(config.batch_size)
        .with_lease_ttl(Duration::from_secs(config.lease_ttl_secs))
        .with_recent_errors_limit(config.recent_errors)
        .with_filter(filter);

    let store: SqliteMigrationStore = SqliteMigrationStore::open(&config.state_db)
        .with_context(|| format!("opening state database {}", config.state_db.display()))?;
    let index: SqliteAttachmentIndex = SqliteAttachmentIndex::open(&config.index_db)
        .with_context(|| format!("opening attachment index {}", config.index_db.display()))?;
    let objects: S3ObjectStore = S3ObjectStore::new(offload)
        .await
        .context("configuring object store")?;

    Ok(MigrationController::new(
        Arc::new(store),
        Arc::new(objects),
        Arc::new(index),
        settings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_flags() {
        let cli: Cli = Cli::try_parse_from([
            "s3-offload",
            "--root",
            "/var/www/uploads",
            "--bucket",
            "media",
            "--exclude",
            "**/*.tmp",
            "run",
            "--reset",
        ])
        .unwrap();

        assert_eq!(cli.config.root, Some(PathBuf::from("/var/www/uploads")));
        assert_eq!(cli.config.exclude, vec!["**/*.tmp"]);
        assert!(matches!(cli.cmd, Cmd::Run { reset: true, interval_ms: 250 }));
        assert_eq!(cli.config.lease_ttl_secs, 300);
        assert_eq!(cli.config.recent_errors, 10);
    }

    #[test]
    fn test_zero_lease_ttl_is_rejected() {
        let result = Cli::try_parse_from(["s3-offload", "--lease-ttl-secs", "0", "status"]);
        assert!(result.is_err());

        let cli: Cli =
            Cli::try_parse_from(["s3-offload", "--lease-ttl-secs", "30", "--recent-errors", "25", "errors"])
                .unwrap();
        assert_eq!(cli.config.lease_ttl_secs, 30);
        assert_eq!(cli.config.recent_errors, 25);
        assert!(matches!(cli.cmd, Cmd::Errors));
    }
}
