use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::task::JoinHandle;

use super::dispatcher::RowJob;
use super::failure::{FailureKind, FailureReporter, RowFailure};
use super::tracker::CompletionTracker;
use crate::db::{InsertStatement, WriteTarget};
use crate::telemetry::{ProgressReporter, TelemetryEvent};

/// Per-worker outcome counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub rows_loaded: u64,
    pub rows_failed: u64,
    pub rows_skipped: u64,
}

/// State every worker shares for the duration of a run
#[derive(Clone)]
pub struct WorkerContext {
    pub target: Arc<dyn WriteTarget>,
    pub statement: Arc<InsertStatement>,
    pub tracker: Arc<CompletionTracker>,
    pub failures: FailureReporter,
    pub progress: Arc<ProgressReporter>,
}

/// Worker that writes row jobs until the job channel is closed and drained
pub struct Worker {
    pub worker_id: usize,
    jobs: async_channel::Receiver<RowJob>,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(worker_id: usize, jobs: async_channel::Receiver<RowJob>, ctx: WorkerContext) -> Self {
        Self {
            worker_id,
            jobs,
            ctx,
        }
    }

    /// Run the worker loop until no more work is available
    pub async fn run(self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();

        while let Ok(job) = self.jobs.recv().await {
            let unit = PendingUnit::new(&self.ctx.tracker);
            if self.ctx.failures.is_aborted() {
                stats.rows_skipped += 1;
                self.ctx.progress.record(TelemetryEvent::RowSkipped);
            } else {
                self.process(job, &mut stats).await;
            }
            unit.complete()?;
        }

        tracing::debug!(
            worker_id = self.worker_id,
            loaded = stats.rows_loaded,
            failed = stats.rows_failed,
            skipped = stats.rows_skipped,
            "worker finished"
        );
        Ok(stats)
    }

    async fn process(&self, job: RowJob, stats: &mut WorkerStats) {
        let start = Instant::now();

        match self.ctx.target.execute(&self.ctx.statement, &job.fields).await {
            Ok(()) => {
                stats.rows_loaded += 1;
                self.ctx.progress.record(TelemetryEvent::RowLoaded {
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                stats.rows_failed += 1;
                self.ctx.progress.record(TelemetryEvent::RowFailed);
                self.ctx.failures.report(RowFailure {
                    row_index: job.row_index,
                    kind: FailureKind::InsertFailed,
                    message: format!("{:#}", e),
                });
            }
        }
    }
}

/// Completion unit of one received job.
///
/// Released on drop if the job never completed, so a panicking write
/// still lets the tracker reach zero.
struct PendingUnit<'a> {
    tracker: &'a CompletionTracker,
    completed: bool,
}

impl<'a> PendingUnit<'a> {
    fn new(tracker: &'a CompletionTracker) -> Self {
        Self {
            tracker,
            completed: false,
        }
    }

    fn complete(mut self) -> Result<()> {
        self.completed = true;
        self.tracker.done()
    }
}

impl Drop for PendingUnit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let _ = self.tracker.done();
        }
    }
}

/// Spawn exactly `count` workers sharing one job receiver
pub fn spawn_workers(
    count: usize,
    jobs: async_channel::Receiver<RowJob>,
    ctx: WorkerContext,
) -> Vec<JoinHandle<Result<WorkerStats>>> {
    tracing::info!("Spawning {} workers...", count);

    (0..count)
        .map(|worker_id| {
            let worker = Worker::new(worker_id, jobs.clone(), ctx.clone());
            tokio::spawn(worker.run())
        })
        .collect()
}
