//! Staged pipeline: source, filters, buffer, sink.

mod batch;
mod filter;
pub mod handoff;
mod metrics;
mod sink;
mod source;
mod stages;

pub use batch::{BufferStage, FlushTrigger};
pub use filter::{run_filter_stage, FilterKind};
pub use handoff::StageExit;
pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use sink::run_sink;
pub use source::{run_source_stage, SourceSettings};
pub use stages::{Pipeline, PipelineConfig, PipelineStats, RunningPipeline};
