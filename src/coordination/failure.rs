use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use tokio::sync::mpsc;

/// What the run does after a row fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop dispatching, skip queued rows and fail the run
    #[default]
    Abort,
    /// Record the failure and keep loading
    Continue,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            other => bail!("Unsupported failure policy '{}'. Use 'abort' or 'continue'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    FieldCountMismatch,
    InsertFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::FieldCountMismatch => write!(f, "field count mismatch"),
            FailureKind::InsertFailed => write!(f, "insert failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based record position in the source; the header is record 1
    pub row_index: u64,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}: {}", self.row_index, self.kind, self.message)
    }
}

/// Cloneable handle the dispatcher and workers use to report row failures
#[derive(Debug, Clone)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<RowFailure>,
    policy: FailurePolicy,
    aborted: Arc<AtomicBool>,
}

impl FailureReporter {
    pub fn report(&self, failure: RowFailure) {
        tracing::warn!(row = failure.row_index, kind = %failure.kind, "{}", failure.message);

        if self.policy == FailurePolicy::Abort {
            self.aborted.store(true, Ordering::Release);
        }
        // The collector outlives every reporter inside a pipeline run
        let _ = self.tx.send(failure);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// Receiving side, drained by the orchestrator once every job is processed
#[derive(Debug)]
pub struct FailureCollector {
    rx: mpsc::UnboundedReceiver<RowFailure>,
}

impl FailureCollector {
    /// Take every failure reported so far, ordered by row index
    pub fn drain(&mut self) -> Vec<RowFailure> {
        let mut failures = Vec::new();
        while let Ok(failure) = self.rx.try_recv() {
            failures.push(failure);
        }
        failures.sort_by_key(|f| f.row_index);
        failures
    }
}

pub fn failure_channel(policy: FailurePolicy) -> (FailureReporter, FailureCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FailureReporter {
            tx,
            policy,
            aborted: Arc::new(AtomicBool::new(false)),
        },
        FailureCollector { rx },
    )
}
