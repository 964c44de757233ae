use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use tokio::sync::Notify;

/// Counting barrier between the dispatcher and the workers.
///
/// The dispatcher registers a unit of work with [`add`](Self::add) before
/// handing a job off, the worker that processes it calls
/// [`done`](Self::done), and the orchestrator blocks in
/// [`wait`](Self::wait) until nothing is pending.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    pending: AtomicUsize,
    zero: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, count: usize) {
        self.pending.fetch_add(count, Ordering::AcqRel);
    }

    /// Mark one unit complete. Errors if nothing is pending.
    pub fn done(&self) -> Result<()> {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| anyhow!("Completion tracker underflow: done() called with nothing pending"))?;

        if previous == 1 {
            self.zero.notify_waiters();
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until the pending count reaches zero
    pub async fn wait(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // Register before checking so a notify between the check and the await is not lost
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
