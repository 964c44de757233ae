use std::collections::BTreeMap;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Telemetry events sent from workers after each job
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Row was inserted successfully
    RowLoaded { duration_ms: u64 },
    /// Row insert was rejected
    RowFailed,
    /// Row was drained without being written because the run aborted
    RowSkipped,
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub rows_loaded: u64,
    pub rows_failed: u64,
    pub rows_skipped: u64,
    /// Insert latency histogram: milliseconds to number of inserts
    pub insert_durations_ms: BTreeMap<u64, u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RowLoaded { duration_ms } => {
                self.rows_loaded += 1;
                *self.insert_durations_ms.entry(*duration_ms).or_default() += 1;
            }
            TelemetryEvent::RowFailed => self.rows_failed += 1,
            TelemetryEvent::RowSkipped => self.rows_skipped += 1,
        }
    }

    /// Nearest-rank percentiles of insert durations, in the order of `ps`
    fn percentiles<const N: usize>(&self, ps: [f64; N]) -> [Option<u64>; N] {
        let total = self.rows_loaded;
        let mut out = [None; N];
        if self.insert_durations_ms.is_empty() {
            return out;
        }

        // Ranks are 1-based; `ps` is ascending so one walk serves all of them
        let ranks = ps.map(|p| (((p / 100.0) * total as f64).ceil() as u64).clamp(1, total));
        let mut seen = 0u64;
        let mut next = 0;
        for (&ms, &count) in &self.insert_durations_ms {
            seen += count;
            while next < N && ranks[next] <= seen {
                out[next] = Some(ms);
                next += 1;
            }
            if next == N {
                break;
            }
        }
        out
    }

    pub fn percentile(&self, p: f64) -> Option<u64> {
        self.percentiles([p])[0]
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let [p50, p90, p99] = self.percentiles([50.0, 90.0, 99.0]);
        (p50, p90, p99)
    }
}

/// Share of `total_expected` rows loaded so far. 100 when nothing is expected.
pub fn percentage(loaded: u64, total_expected: u64) -> f64 {
    if total_expected == 0 {
        return 100.0;
    }
    loaded as f64 / total_expected as f64 * 100.0
}

/// Console progress line shared by all workers
pub struct ProgressReporter {
    stats: Mutex<ProgressStats>,
    total_expected: u64,
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total_expected: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total_expected);
            bar.set_style(ProgressStyle::default_bar().template("{msg}").unwrap());
            bar
        };
        bar.set_message(format!("Progress: {:.2}%", percentage(0, total_expected)));

        Self {
            stats: Mutex::new(ProgressStats::new()),
            total_expected,
            bar,
        }
    }

    /// Apply `event` and redraw the progress line. Returns the new percentage.
    pub fn record(&self, event: TelemetryEvent) -> f64 {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.update(&event);

        let pct = percentage(stats.rows_loaded, self.total_expected);
        self.bar.set_position(stats.rows_loaded);
        self.bar.set_message(format!("Progress: {:.2}%", pct));
        pct
    }

    pub fn snapshot(&self) -> ProgressStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn percentage(&self) -> f64 {
        let loaded = self.stats.lock().unwrap_or_else(|e| e.into_inner()).rows_loaded;
        percentage(loaded, self.total_expected)
    }

    /// Leave the final progress line on screen
    pub fn finish(&self) {
        self.bar.finish();
    }
}
