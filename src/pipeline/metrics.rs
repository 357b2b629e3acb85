//! Stage counters and periodic progress reporting.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::pipeline::{FilterKind, FlushTrigger};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Lines read by the source stage
    pub lines_read: AtomicU64,

    /// Lines that were not integers
    pub malformed_lines: AtomicU64,

    /// Integers handed to the first filter
    pub elements_parsed: AtomicU64,

    /// Elements dropped by the non-negative filter
    pub filtered_negative: AtomicU64,

    /// Elements dropped by the multiple-of-three filter
    pub filtered_not_multiple: AtomicU64,

    /// Elements appended to the buffer
    pub elements_buffered: AtomicU64,

    /// Flushes triggered by a full buffer
    pub capacity_flushes: AtomicU64,

    /// Flushes triggered by the periodic timer
    pub timer_flushes: AtomicU64,

    /// Final flushes after upstream closed
    pub drain_flushes: AtomicU64,

    /// Elements written by the sink
    pub elements_emitted: AtomicU64,

    /// Buffered elements dropped because of cancellation
    pub elements_abandoned: AtomicU64,

    /// Reader or writer failures
    pub failures: AtomicU64,

    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    pub fn add_line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_malformed_line(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_element_parsed(&self) {
        self.elements_parsed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an element rejected by the given filter.
    pub fn add_filtered(&self, kind: FilterKind) {
        let counter = match kind {
            FilterKind::NonNegative => &self.filtered_negative,
            FilterKind::PositiveMultipleOfThree => &self.filtered_not_multiple,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_element_buffered(&self) {
        self.elements_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed flush.
    pub fn add_flush(&self, trigger: FlushTrigger) {
        let counter = match trigger {
            FlushTrigger::Capacity => &self.capacity_flushes,
            FlushTrigger::Timer => &self.timer_flushes,
            FlushTrigger::Drain => &self.drain_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_element_emitted(&self) {
        self.elements_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_elements_abandoned(&self, count: u64) {
        self.elements_abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get emitted elements per second.
    pub fn elements_per_second(&self) -> f64 {
        let emitted = self.elements_emitted.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            emitted as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            elements_parsed: self.elements_parsed.load(Ordering::Relaxed),
            filtered_negative: self.filtered_negative.load(Ordering::Relaxed),
            filtered_not_multiple: self.filtered_not_multiple.load(Ordering::Relaxed),
            elements_buffered: self.elements_buffered.load(Ordering::Relaxed),
            capacity_flushes: self.capacity_flushes.load(Ordering::Relaxed),
            timer_flushes: self.timer_flushes.load(Ordering::Relaxed),
            drain_flushes: self.drain_flushes.load(Ordering::Relaxed),
            elements_emitted: self.elements_emitted.load(Ordering::Relaxed),
            elements_abandoned: self.elements_abandoned.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            elements_per_second: self.elements_per_second(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub elements_parsed: u64,
    pub filtered_negative: u64,
    pub filtered_not_multiple: u64,
    pub elements_buffered: u64,
    pub capacity_flushes: u64,
    pub timer_flushes: u64,
    pub drain_flushes: u64,
    pub elements_emitted: u64,
    pub elements_abandoned: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub elements_per_second: f64,
}

impl MetricsSnapshot {
    /// Total flushes across all triggers.
    pub fn total_flushes(&self) -> u64 {
        self.capacity_flushes + self.timer_flushes + self.drain_flushes
    }

    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lines: {} ({} malformed) | Parsed: {} | \
             Filtered: {} negative, {} not multiple of 3 | \
             Flushes: {} capacity, {} timer, {} drain | \
             Emitted: {} @ {:.1}/s | Abandoned: {} | Failures: {} | Elapsed: {:.1}s",
            self.lines_read,
            self.malformed_lines,
            self.elements_parsed,
            self.filtered_negative,
            self.filtered_not_multiple,
            self.capacity_flushes,
            self.timer_flushes,
            self.drain_flushes,
            self.elements_emitted,
            self.elements_per_second,
            self.elements_abandoned,
            self.failures,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("{}", self.metrics.snapshot());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Final: {}", self.metrics.snapshot());
                    break;
                }
            }
        }
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        eprintln!("\n=== Pipeline Summary ===");
        eprintln!("Total time: {:.1}s", snapshot.elapsed.as_secs_f64());
        eprintln!("Lines read: {}", snapshot.lines_read);
        eprintln!("Malformed lines: {}", snapshot.malformed_lines);
        eprintln!("Integers parsed: {}", snapshot.elements_parsed);
        eprintln!("Dropped (negative): {}", snapshot.filtered_negative);
        eprintln!("Dropped (not multiple of 3): {}", snapshot.filtered_not_multiple);
        eprintln!("Buffered: {}", snapshot.elements_buffered);
        eprintln!(
            "Flushes: {} ({} capacity, {} timer, {} drain)",
            snapshot.total_flushes(),
            snapshot.capacity_flushes,
            snapshot.timer_flushes,
            snapshot.drain_flushes
        );
        eprintln!("Emitted: {}", snapshot.elements_emitted);
        if snapshot.elements_abandoned > 0 {
            eprintln!("Abandoned on shutdown: {}", snapshot.elements_abandoned);
        }
        eprintln!("Failures: {}", snapshot.failures);
        eprintln!("========================\n");
    }
}
