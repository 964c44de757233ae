use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::failure::{FailureKind, FailureReporter, RowFailure};
use super::tracker::CompletionTracker;
use crate::formats::RowSource;

/// Column names captured from the first record of the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet(Arc<[String]>);

impl HeaderSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns.into())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// One data record on its way to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowJob {
    /// 1-based record position in the source; the header is record 1
    pub row_index: u64,
    pub fields: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Data records pulled from the source
    pub records_read: u64,
    /// Jobs handed to the worker pool
    pub dispatched: u64,
    /// Records rejected before dispatch
    pub rejected: u64,
    /// Dispatch stopped at `max_records`
    pub capped: bool,
    /// Dispatch stopped because the failure policy aborted the run
    pub aborted: bool,
}

/// Reads records from a source and feeds them to the job channel
pub struct Dispatcher {
    tracker: Arc<CompletionTracker>,
    failures: FailureReporter,
    max_records: Option<u64>,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<CompletionTracker>,
        failures: FailureReporter,
        max_records: Option<u64>,
    ) -> Self {
        Self {
            tracker,
            failures,
            max_records,
        }
    }

    /// Consume the first record of `source` as the header set
    pub async fn read_headers(source: &mut dyn RowSource) -> Result<HeaderSet> {
        let Some(record) = source
            .next_record()
            .await
            .context("Failed to read header record")?
        else {
            bail!("Source is empty: expected a header record");
        };

        if record.fields.iter().all(|f| f.trim().is_empty()) {
            bail!("Header record has no column names");
        }

        Ok(HeaderSet::new(record.fields))
    }

    /// Send every remaining data record to `jobs`, then close the channel.
    ///
    /// The channel is closed on every return path, including read errors.
    pub async fn dispatch(
        &self,
        source: &mut dyn RowSource,
        headers: &HeaderSet,
        jobs: async_channel::Sender<RowJob>,
    ) -> Result<DispatchSummary> {
        let result = self.dispatch_records(source, headers, &jobs).await;
        jobs.close();
        result
    }

    async fn dispatch_records(
        &self,
        source: &mut dyn RowSource,
        headers: &HeaderSet,
        jobs: &async_channel::Sender<RowJob>,
    ) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();
        let mut row_index: u64 = 1;

        loop {
            if self.failures.is_aborted() {
                summary.aborted = true;
                break;
            }
            if self.max_records.is_some_and(|max| summary.records_read >= max) {
                // Only capped if a record remains past the limit
                summary.capped = !matches!(source.next_record().await, Ok(None));
                break;
            }

            let Some(record) = source
                .next_record()
                .await
                .with_context(|| format!("Failed to read record {}", row_index + 1))?
            else {
                break;
            };
            row_index += 1;
            summary.records_read += 1;

            if record.fields.len() != headers.len() {
                summary.rejected += 1;
                self.failures.report(RowFailure {
                    row_index,
                    kind: FailureKind::FieldCountMismatch,
                    message: format!(
                        "expected {} fields, found {}",
                        headers.len(),
                        record.fields.len()
                    ),
                });
                continue;
            }

            self.tracker.add(1);
            let job = RowJob {
                row_index,
                fields: record.fields,
            };
            if jobs.send(job).await.is_err() {
                self.tracker.done()?;
                bail!(
                    "All workers exited before row {} could be dispatched",
                    row_index
                );
            }
            summary.dispatched += 1;
        }

        tracing::debug!(
            records_read = summary.records_read,
            dispatched = summary.dispatched,
            rejected = summary.rejected,
            "dispatch finished"
        );
        Ok(summary)
    }
}
