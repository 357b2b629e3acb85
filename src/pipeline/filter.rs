//! Predicate filter stages.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::handoff::{self, Handoff, Inbound, StageExit};
use crate::pipeline::Metrics;

/// The fixed filters of the pipeline, applied in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Drops negative numbers.
    NonNegative,
    /// Drops zero and every number that is not a multiple of 3.
    PositiveMultipleOfThree,
}

impl FilterKind {
    /// Whether `value` passes this filter.
    pub fn accepts(self, value: i64) -> bool {
        match self {
            FilterKind::NonNegative => value >= 0,
            FilterKind::PositiveMultipleOfThree => value != 0 && value % 3 == 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::NonNegative => "non-negative",
            FilterKind::PositiveMultipleOfThree => "multiple-of-3",
        }
    }
}

/// Forward every element of `input` that passes `kind` to `output`.
///
/// Returns when upstream closes, downstream goes away, or cancellation
/// fires. Rejected elements are only counted.
pub async fn run_filter_stage(
    kind: FilterKind,
    input: flume::Receiver<i64>,
    output: flume::Sender<i64>,
    token: CancellationToken,
    metrics: Arc<Metrics>,
) -> StageExit {
    loop {
        let value = match handoff::recv(&input, &token).await {
            Inbound::Item(value) => value,
            Inbound::Closed => {
                tracing::debug!("Upstream closed, stopping {} filter", kind.name());
                return StageExit::Finished;
            }
            Inbound::Cancelled => {
                tracing::debug!("{} filter cancelled", kind.name());
                return StageExit::Cancelled;
            }
        };

        if !kind.accepts(value) {
            metrics.add_filtered(kind);
            continue;
        }

        match handoff::send(&output, value, &token).await {
            Handoff::Delivered => {}
            Handoff::Cancelled => {
                tracing::debug!("{} filter cancelled while sending {}", kind.name(), value);
                return StageExit::Cancelled;
            }
            Handoff::Closed => return StageExit::DownstreamClosed,
        }
    }
}
