//! O(1) running min/max/mean accumulator for per-frame timing

use std::fmt;
use std::time::{Duration, Instant};

use tracing::warn;

/// Accumulates per-frame processing durations without retaining samples.
///
/// `begin()`/`end()` delimit one measurement window. The accumulator keeps
/// min, max and an incremental mean; individual samples are discarded.
#[derive(Debug, Default)]
pub struct RunningStats {
    min: Option<Duration>,
    max: Option<Duration>,
    average: Duration,
    count: u64,
    tic: Option<Instant>,
    start: Option<Instant>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a measurement window. The very first call also pins the
    /// wall-clock start used by the final report.
    pub fn begin(&mut self) {
        let now = Instant::now();
        if self.start.is_none() {
            self.start = Some(now);
        }
        self.tic = Some(now);
    }

    /// Close the current measurement window and fold the elapsed time into
    /// the accumulator. Returns the updated average, or `None` when no
    /// window was open (a usage error, not a crash).
    pub fn end(&mut self) -> Option<Duration> {
        let toc = Instant::now();
        let Some(tic) = self.tic.take() else {
            warn!("stats end() without a matching begin(), sample discarded");
            return None;
        };
        Some(self.record(toc.duration_since(tic)))
    }

    /// Fold one elapsed sample into min/max/average/count.
    ///
    /// Both bounds are updated independently so the first sample sets min
    /// and max at once.
    fn record(&mut self, elapsed: Duration) -> Duration {
        match self.max {
            Some(max) if elapsed <= max => {}
            _ => self.max = Some(elapsed),
        }
        match self.min {
            Some(min) if elapsed >= min => {}
            _ => self.min = Some(elapsed),
        }

        // Incremental mean: average = (average*count + elapsed) / (count + 1)
        let total = self.average.as_secs_f64() * self.count as f64 + elapsed.as_secs_f64();
        self.average = Duration::from_secs_f64(total / (self.count + 1) as f64);
        self.count += 1;

        self.average
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Snapshot for display. Non-mutating, valid at any point of the run;
    /// before the first sample min/max/total are absent.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            min: self.min,
            max: self.max,
            average: self.average,
            total_elapsed: self.start.map(|start| start.elapsed()),
            count: self.count,
        }
    }
}

/// Final human-readable timing summary
#[derive(Debug, Clone, Copy)]
pub struct StatsReport {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub average: Duration,
    pub total_elapsed: Option<Duration>,
    pub count: u64,
}

fn fmt_duration(d: Option<Duration>) -> String {
    match d {
        Some(d) => format!("{d:?}"),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=========================================")?;
        writeln!(f, " Stat       \t\tValue")?;
        writeln!(f, "=========================================")?;
        writeln!(f, " Minimum    \t\t{}", fmt_duration(self.min))?;
        writeln!(f, " Maximum    \t\t{}", fmt_duration(self.max))?;
        writeln!(f, " Average    \t\t{:?}", self.average)?;
        writeln!(f, "=========================================")?;
        writeln!(f, " Total time \t\t{}", fmt_duration(self.total_elapsed))?;
        writeln!(f, " Samples    \t\t{}", self.count)?;
        write!(f, "=========================================")
    }
}
