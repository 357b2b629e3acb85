//! Pipeline assembly.
//!
//! Five tasks connected by rendezvous channels, one producer per channel:
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌──────────┐   ┌────────┐   ┌──────┐
//! │ Source │──▶│ Filter A │──▶│ Filter B │──▶│ Buffer │──▶│ Sink │
//! └────────┘   └──────────┘   └──────────┘   └────────┘   └──────┘
//!      ▲             ▲              ▲             ▲           ▲
//!      └─────────────┴──── CancellationToken ─────┴───────────┘
//! ```
//!
//! Normal shutdown flows downstream: each stage returns when its input
//! closes and drops its own sender. Cancellation is broadcast to every stage
//! at once and each stage abandons whatever send or receive it is blocked on.

use crate::config::Config;
use crate::pipeline::handoff::{self, StageExit};
use crate::pipeline::{
    run_filter_stage, run_sink, run_source_stage, BufferStage, FilterKind, Metrics,
    MetricsSnapshot, SourceSettings,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Elements per capacity flush
    pub capacity: usize,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Line that ends the input
    pub quit_sentinel: String,
    /// Diagnostic printed for malformed lines
    pub invalid_input_message: String,
    /// Label printed before every output value
    pub label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            capacity: config.buffer.capacity,
            flush_interval: config.buffer.flush_interval(),
            quit_sentinel: config.input.quit_sentinel.clone(),
            invalid_input_message: config.input.invalid_input_message.clone(),
            label: config.output.label.clone(),
        }
    }
}

/// Pipeline builder: one `spawn` per run.
pub struct Pipeline {
    config: PipelineConfig,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(config: PipelineConfig, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    /// Run the pipeline to completion over `reader`, writing to `writer`.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<PipelineStats>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.spawn(reader, writer).wait().await
    }

    /// Start every stage and return a handle to the running pipeline.
    ///
    /// Must be called from within a Tokio runtime, with a validated
    /// configuration (non-zero capacity and flush interval).
    pub fn spawn<R, W>(&self, reader: R, writer: W) -> RunningPipeline
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug_assert!(self.config.capacity > 0, "buffer capacity must be non-zero");
        debug_assert!(!self.config.flush_interval.is_zero(), "flush interval must be non-zero");

        let token = CancellationToken::new();

        let (source_tx, source_rx) = handoff::channel::<i64>();
        let (filtered_tx, filtered_rx) = handoff::channel::<i64>();
        let (batch_tx, batch_rx) = handoff::channel::<i64>();
        let (sink_tx, sink_rx) = handoff::channel::<i64>();

        let source = tokio::spawn(run_source_stage(
            reader,
            source_tx,
            token.clone(),
            SourceSettings {
                quit_sentinel: self.config.quit_sentinel.clone(),
                invalid_input_message: self.config.invalid_input_message.clone(),
            },
            self.metrics.clone(),
        ));

        let non_negative = tokio::spawn(run_filter_stage(
            FilterKind::NonNegative,
            source_rx,
            filtered_tx,
            token.clone(),
            self.metrics.clone(),
        ));

        let multiple_of_three = tokio::spawn(run_filter_stage(
            FilterKind::PositiveMultipleOfThree,
            filtered_rx,
            batch_tx,
            token.clone(),
            self.metrics.clone(),
        ));

        let buffer = BufferStage::new(
            self.config.capacity,
            self.config.flush_interval,
            self.metrics.clone(),
        );
        let buffer = tokio::spawn(buffer.run(batch_rx, sink_tx, token.clone()));

        let sink = tokio::spawn(run_sink(
            sink_rx,
            writer,
            self.config.label.clone(),
            token.clone(),
            self.metrics.clone(),
        ));

        tracing::debug!(
            "Pipeline started (capacity {}, flush every {:?})",
            self.config.capacity,
            self.config.flush_interval
        );

        RunningPipeline {
            token,
            source,
            filters: [non_negative, multiple_of_three],
            buffer,
            sink,
            metrics: self.metrics.clone(),
        }
    }
}

/// Handle to a pipeline whose stages are running.
pub struct RunningPipeline {
    token: CancellationToken,
    source: JoinHandle<StageExit>,
    filters: [JoinHandle<StageExit>; 2],
    buffer: JoinHandle<StageExit>,
    sink: JoinHandle<StageExit>,
    metrics: Arc<Metrics>,
}

impl RunningPipeline {
    /// Token shared by every stage. Cancelling it stops the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the run and wait for every stage to finish.
    pub async fn stop(self) -> Result<PipelineStats> {
        self.token.cancel();
        self.wait().await
    }

    /// Wait for the sink to finish, then release and join every stage.
    pub async fn wait(self) -> Result<PipelineStats> {
        let sink_exit = self.sink.await?;

        // Nothing downstream is listening any more
        let cancelled = self.token.is_cancelled();
        self.token.cancel();

        let source_exit = self.source.await?;
        let [non_negative, multiple_of_three] = self.filters;
        let filter_exits = [non_negative.await?, multiple_of_three.await?];
        let buffer_exit = self.buffer.await?;

        tracing::debug!(
            "Stages finished: source {}, filters {}/{}, buffer {}, sink {}",
            source_exit,
            filter_exits[0],
            filter_exits[1],
            buffer_exit,
            sink_exit
        );

        Ok(PipelineStats {
            source_exit,
            sink_exit,
            cancelled,
            metrics: self.metrics.snapshot(),
        })
    }
}

/// Statistics from a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Why the source stopped reading
    pub source_exit: StageExit,
    /// Why the sink stopped writing
    pub sink_exit: StageExit,
    /// Whether the run was cancelled before the sink drained
    pub cancelled: bool,
    /// Counters at the end of the run
    pub metrics: MetricsSnapshot,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Source: {}, Emitted: {}, Flushes: {}, Malformed: {}, Cancelled: {}",
            self.source_exit,
            self.metrics.elements_emitted,
            self.metrics.total_flushes(),
            self.metrics.malformed_lines,
            self.cancelled
        )
    }
}
