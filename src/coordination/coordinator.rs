use anyhow::{Context, Result, ensure};
use derive_builder::Builder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::dispatcher::{DispatchSummary, Dispatcher};
use super::failure::{FailurePolicy, RowFailure, failure_channel};
use super::tracker::CompletionTracker;
use super::worker::{WorkerContext, WorkerStats, spawn_workers};
use crate::config::{JOB_CHANNEL_CAPACITY, NUM_WORKERS};
use crate::db::{InsertStatement, WriteTarget};
use crate::formats::RowSource;
use crate::telemetry::ProgressReporter;

/// Configuration for one pipeline run
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct PipelineConfig {
    #[builder(setter(into))]
    pub table: String,
    #[builder(default = "NUM_WORKERS")]
    pub worker_count: usize,
    #[builder(default = "JOB_CHANNEL_CAPACITY")]
    pub channel_capacity: usize,
    /// Maximum number of data records to consume
    #[builder(default)]
    pub max_records: Option<u64>,
    /// Row count the progress line is measured against
    #[builder(default)]
    pub expected_rows: Option<u64>,
    #[builder(default)]
    pub failure_policy: FailurePolicy,
    #[builder(default)]
    pub quiet: bool,
}

impl PipelineConfig {
    /// Total the progress percentage is computed against
    pub fn total_expected(&self) -> u64 {
        self.expected_rows.or(self.max_records).unwrap_or(0)
    }
}

/// Result of a completed pipeline run
#[derive(Debug)]
pub struct PipelineResult {
    /// Column names taken from the header record
    pub headers: Vec<String>,
    pub records_read: u64,
    pub rows_dispatched: u64,
    pub rows_loaded: u64,
    pub rows_skipped: u64,
    /// Every rejected row, ordered by row index
    pub failures: Vec<RowFailure>,
    pub capped: bool,
    pub aborted: bool,
    pub progress_percentage: f64,
    pub insert_latency_ms: (Option<u64>, Option<u64>, Option<u64>),
    pub duration: Duration,
}

impl PipelineResult {
    pub fn first_failure(&self) -> Option<&RowFailure> {
        self.failures.first()
    }
}

/// Concurrent ingestion: one dispatcher feeding a fixed pool of workers
pub struct Pipeline {
    config: PipelineConfig,
    target: Arc<dyn WriteTarget>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, target: Arc<dyn WriteTarget>) -> Self {
        Self { config, target }
    }

    /// Run the complete ingestion over `source`
    ///
    /// 1. Read the header set and build the INSERT statement
    /// 2. Spawn the worker pool on a bounded job channel
    /// 3. Dispatch every data record, then close the channel
    /// 4. Wait for every dispatched job and aggregate results
    pub async fn run(&self, mut source: Box<dyn RowSource>) -> Result<PipelineResult> {
        ensure!(self.config.worker_count > 0, "Worker count must be at least 1");
        ensure!(
            self.config.channel_capacity > 0,
            "Job channel capacity must be at least 1"
        );
        let start_time = Instant::now();

        // 1. Header set and statement
        let headers = Dispatcher::read_headers(source.as_mut()).await?;
        let column_types = self
            .target
            .column_types(&self.config.table)
            .await
            .context("Failed to resolve destination column types")?;
        let statement = InsertStatement::build(
            self.target.dialect(),
            &self.config.table,
            headers.columns(),
            &column_types,
        );
        info!(columns = headers.len(), "{}", statement.sql);

        // 2. Shared state and workers
        let tracker = Arc::new(CompletionTracker::new());
        let (failures, mut collector) = failure_channel(self.config.failure_policy);
        let progress = Arc::new(ProgressReporter::new(
            self.config.total_expected(),
            self.config.quiet,
        ));
        let (jobs_tx, jobs_rx) = async_channel::bounded(self.config.channel_capacity);

        let ctx = WorkerContext {
            target: Arc::clone(&self.target),
            statement: Arc::new(statement),
            tracker: Arc::clone(&tracker),
            failures: failures.clone(),
            progress: Arc::clone(&progress),
        };
        let worker_handles = spawn_workers(self.config.worker_count, jobs_rx, ctx);

        // 3. Dispatch
        let dispatcher = Dispatcher::new(
            Arc::clone(&tracker),
            failures.clone(),
            self.config.max_records,
        );
        let dispatched = dispatcher
            .dispatch(source.as_mut(), &headers, jobs_tx)
            .await;

        // 4. Wait. Workers exit once the closed channel is drained.
        if dispatched.is_ok() {
            tracker.wait().await;
        }
        let worker_results = futures::future::join_all(worker_handles).await;
        progress.finish();

        let summary: DispatchSummary = dispatched?;
        let worker_stats = Self::collect_worker_stats(worker_results)?;
        ensure!(
            tracker.pending() == 0,
            "{} dispatched rows were never completed",
            tracker.pending()
        );

        let stats = progress.snapshot();
        let result = PipelineResult {
            headers: headers.columns().to_vec(),
            records_read: summary.records_read,
            rows_dispatched: summary.dispatched,
            rows_loaded: worker_stats.rows_loaded,
            rows_skipped: worker_stats.rows_skipped,
            failures: collector.drain(),
            capped: summary.capped,
            aborted: summary.aborted || failures.is_aborted(),
            progress_percentage: progress.percentage(),
            insert_latency_ms: stats.get_percentiles(),
            duration: start_time.elapsed(),
        };

        info!(
            "Pipeline complete: {} records read, {} rows dispatched, {} rows loaded, {} rows failed in {:.2}s",
            result.records_read,
            result.rows_dispatched,
            result.rows_loaded,
            result.failures.len(),
            result.duration.as_secs_f64()
        );

        Ok(result)
    }

    fn collect_worker_stats(
        results: Vec<Result<Result<WorkerStats>, tokio::task::JoinError>>,
    ) -> Result<WorkerStats> {
        let mut total = WorkerStats::default();
        let mut first_error = None;

        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(stats)) => {
                    total.rows_loaded += stats.rows_loaded;
                    total.rows_failed += stats.rows_failed;
                    total.rows_skipped += stats.rows_skipped;
                }
                Ok(Err(e)) => {
                    warn!("Worker {} failed: {:#}", i, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!("Worker {} panicked: {:#}", i, e);
                    first_error.get_or_insert(anyhow::Error::new(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e.context("Worker failed")),
            None => Ok(total),
        }
    }
}
