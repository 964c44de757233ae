//! High-level runner API for the data loader.
//!
//! This module wraps dataset preparation, connection setup, schema bootstrap
//! and the ingestion pipeline behind a single call.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result, bail, ensure};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::coordination::{Pipeline, PipelineConfigBuilder, RowFailure};
use crate::db::pool::{PoolArgsBuilder, PoolStats};
use crate::db::{self as db_pool, WriteTarget};
use crate::formats::open_row_source;
use crate::io::{SourceUri, ensure_dataset, file_exists};

pub use crate::config::{
    DATASET_FILE_PATH, DATASET_URL, DB_MAX_CONN, DEFAULT_TABLE, DatabaseSettings,
    DatabaseSettingsBuilder, Driver, ENV_FILE, JOB_CHANNEL_CAPACITY, MAX_RECORDS, NUM_WORKERS,
    load_env_file,
};
pub use crate::coordination::FailurePolicy;
pub use crate::formats::Format;

/// Arguments for running a data load operation
#[derive(Debug, Clone)]
pub struct LoadArgs {
    // Connection configuration
    pub database: DatabaseSettings,
    pub max_connections: u32,

    // Source configuration
    /// Where to download the dataset from when it is missing locally
    pub dataset_url: Option<String>,
    /// Local path or file:// URI of the dataset
    pub dataset_path: String,
    /// Auto-detected from the file extension if not specified, defaulting to CSV
    pub format: Option<Format>,
    pub target_table: String,

    // Pipeline tuning
    pub worker_count: usize,
    pub channel_capacity: usize,
    pub max_records: Option<u64>,
    pub expected_rows: Option<u64>,
    pub failure_policy: FailurePolicy,

    // Options
    pub skip_bootstrap: bool,
    pub quiet: bool,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::Pool>,
}

/// Result of a completed data load operation
#[derive(Debug)]
pub struct LoadResult {
    pub job_id: String,
    /// Destination columns, in source field order
    pub columns: Vec<String>,
    pub records_read: u64,
    pub records_loaded: u64,
    pub records_failed: u64,
    pub records_skipped: u64,
    /// Rows rejected under the `continue` policy
    pub failures: Vec<RowFailure>,
    /// Stopped at `max_records` before the end of the dataset
    pub capped: bool,
    pub progress_percentage: f64,
    pub insert_latency_ms: (Option<u64>, Option<u64>, Option<u64>),
    pub pool_stats: PoolStats,
    pub duration: Duration,
}

/// Resolve the dataset location, downloading it first when it is missing
async fn prepare_dataset(args: &LoadArgs) -> Result<PathBuf> {
    let path = match SourceUri::parse(&args.dataset_path)? {
        SourceUri::Local(path) => path,
        SourceUri::Http(url) => bail!(
            "Dataset path must be local, got '{}'. Use --dataset-url to download it",
            url
        ),
    };

    match &args.dataset_url {
        Some(url) => match SourceUri::parse(url)? {
            SourceUri::Http(url) => ensure_dataset(&url, &path).await?,
            SourceUri::Local(_) => bail!("Dataset URL must be http(s), got '{}'", url),
        },
        None => ensure!(
            file_exists(&path).await?,
            "Dataset not found at {}",
            path.display()
        ),
    }

    Ok(path)
}

/// Run a data load operation with the specified arguments
///
/// This is the main entry point. It handles:
/// - Checking for the dataset and downloading it when missing
/// - Creating the connection pool
/// - Creating the destination table
/// - Streaming the dataset through the worker pool
///
/// # Example
///
/// ```no_run
/// use data_loader::runner::{
///     DatabaseSettingsBuilder, Driver, FailurePolicy, LoadArgs, run_load,
/// };
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     database: DatabaseSettingsBuilder::default()
///         .driver(Driver::Postgres)
///         .host("localhost")
///         .username("postgres")
///         .password("secret")
///         .database("loader")
///         .build()?,
///     max_connections: 100,
///     dataset_url: Some("https://downloads.majestic.com/majestic_million.csv".to_string()),
///     dataset_path: "./majestic_million.csv".to_string(),
///     format: None,
///     target_table: "domain".to_string(),
///     worker_count: 95,
///     channel_capacity: 1,
///     max_records: Some(1_000_000),
///     expected_rows: None,
///     failure_policy: FailurePolicy::Abort,
///     skip_bootstrap: false,
///     quiet: true,
/// };
///
/// let result = run_load(args).await?;
/// println!("Loaded {} records in {:?}", result.records_loaded, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadResult> {
    let job_id = Uuid::new_v4().to_string();
    info!("Starting load job: {}", job_id);

    // Workers each hold a connection while inserting; keep headroom for bootstrap
    ensure!(
        args.worker_count < args.max_connections as usize,
        "Worker count ({}) must be lower than the maximum number of connections ({})",
        args.worker_count,
        args.max_connections
    );

    let dataset_path = prepare_dataset(&args).await?;

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = if let Some(test_pool) = args.test_pool {
        test_pool
    } else {
        let pool_args = PoolArgsBuilder::default()
            .settings(args.database.clone())
            .max_pool_size(args.max_connections)
            .build()?;
        db_pool::pool::pool(pool_args).await?
    };

    #[cfg(not(test))]
    let pool = {
        let pool_args = PoolArgsBuilder::default()
            .settings(args.database.clone())
            .max_pool_size(args.max_connections)
            .build()?;
        db_pool::pool::pool(pool_args).await?
    };

    if !args.skip_bootstrap {
        pool.ensure_table(&args.target_table).await?;
    }

    let format = args
        .format
        .or_else(|| Format::detect(&dataset_path))
        .unwrap_or(Format::Csv);
    let source = open_row_source(&dataset_path, format).await?;

    let config = PipelineConfigBuilder::default()
        .table(args.target_table.as_str())
        .worker_count(args.worker_count)
        .channel_capacity(args.channel_capacity)
        .max_records(args.max_records)
        .expected_rows(args.expected_rows)
        .failure_policy(args.failure_policy)
        .quiet(args.quiet)
        .build()?;

    let target: Arc<dyn WriteTarget> = Arc::new(pool.clone());
    let result = Pipeline::new(config, target)
        .run(source)
        .await
        .with_context(|| format!("Load job {} failed", job_id))?;

    let pool_stats = pool.stats();
    info!(
        connections = pool_stats.connections,
        idle_connections = pool_stats.idle_connections,
        "connection pool stats"
    );

    if result.aborted {
        match result.first_failure() {
            Some(failure) => bail!("Load aborted at {}", failure),
            None => bail!("Load aborted"),
        }
    }

    Ok(LoadResult {
        job_id,
        columns: result.headers,
        records_read: result.records_read,
        records_loaded: result.rows_loaded,
        records_failed: result.failures.len() as u64,
        records_skipped: result.rows_skipped,
        failures: result.failures,
        capped: result.capped,
        progress_percentage: result.progress_percentage,
        insert_latency_ms: result.insert_latency_ms,
        pool_stats,
        duration: result.duration,
    })
}
