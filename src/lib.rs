//! numbatch
//!
//! Streaming pipeline that reads integers line by line, keeps the positive
//! multiples of three, and emits them in groups bounded by size and time.
//!
//! # Architecture
//!
//! - **Source**: parses stdin lines, stops on end of input or the quit sentinel
//! - **Filters**: drop negative numbers, then zero and non-multiples of 3
//! - **Buffer**: flushes on capacity, on a periodic timer, or when input ends
//! - **Sink**: prints `<label>: <value>` for every emitted element
//!
//! Every stage is a Tokio task; a shared `CancellationToken` stops them all.
//!
//! # Usage
//!
//! ```no_run
//! use numbatch::{Config, run_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"numbatch.yaml".into())?;
//!     run_pipeline(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{Metrics, Pipeline, PipelineConfig, PipelineStats, StageExit};

use anyhow::Result;
use pipeline::MetricsReporter;
use tokio::io::BufReader;
use tokio::sync::mpsc;

/// Run the pipeline over stdin and stdout with the given configuration.
///
/// Returns once input ends or Ctrl-C is received.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats> {
    config.validate()?;

    tracing::info!("Starting numbatch pipeline");
    tracing::info!(
        "Buffer capacity {}, flush interval {} ms",
        config.buffer.capacity,
        config.buffer.flush_interval_ms
    );

    let metrics = Metrics::new();

    // Start metrics reporter if enabled
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let reporter_handle = if config.processing.enable_metrics {
        let reporter =
            MetricsReporter::new(metrics.clone(), config.processing.metrics_interval_secs);
        Some(tokio::spawn(reporter.run(shutdown_rx)))
    } else {
        drop(shutdown_rx);
        None
    };

    if let Some(prompt) = &config.input.prompt {
        println!("{}", prompt);
    }

    let pipeline = Pipeline::new(PipelineConfig::from(&config), metrics.clone());
    let running = pipeline.spawn(BufReader::new(tokio::io::stdin()), tokio::io::stdout());

    let token = running.cancellation_token();
    let interrupt = tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Interrupted, shutting down");
                    token.cancel();
                }
                Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    });

    let stats = running.wait().await?;
    if let Err(e) = interrupt.await {
        tracing::warn!("Ctrl-C listener task failed: {}", e);
    }

    // Shutdown metrics reporter
    let _ = shutdown_tx.send(()).await;
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    if config.processing.enable_metrics {
        MetricsReporter::new(metrics.clone(), config.processing.metrics_interval_secs)
            .print_summary();
    }

    if let Some(ref path) = config.processing.metrics_output_path {
        if let Err(e) = stats.metrics.save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path, e);
        }
    }

    tracing::info!("Pipeline complete: {}", stats);

    Ok(stats)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_runtime() {
        let runtime = build_runtime(Some(2)).unwrap();
        let value = runtime.block_on(async { 3 });
        assert_eq!(value, 3);
    }

    #[test]
    fn test_run_pipeline_rejects_invalid_config() {
        let mut config = Config::default();
        config.buffer.capacity = 0;

        let runtime = build_runtime(Some(1)).unwrap();
        assert!(runtime.block_on(run_pipeline(config)).is_err());
    }
}
