//! Buffer stage: groups elements and flushes them by size, time, or close.
//!
//! The stage owns its buffer outright. All three flush triggers are observed
//! through one `select!` loop over the cancellation token, the inbound
//! channel, and the flush timer, so the buffer never needs a lock.
//!
//! ```text
//!              element (len < K)            len == K
//!   Collecting ───────────────▶ Collecting ──────────▶ Flushing ──┐
//!       ▲   │ timer, len > 0                                       │
//!       │   └──────────────────────────────▶ Flushing ─────────────┤
//!       └──────────────────────────────────────────────────────────┘
//!   upstream closed: Draining-Final (if non-empty) ──▶ Terminated
//!   cancellation: ──▶ Terminated (buffered elements are dropped)
//! ```
//!
//! The flush timer restarts after every flush, whichever trigger caused it,
//! so a capacity flush is never followed by a stale timer flush.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pipeline::handoff::{self, Handoff, StageExit};
use crate::pipeline::Metrics;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The buffer reached capacity.
    Capacity,
    /// The flush interval elapsed with elements pending.
    Timer,
    /// Upstream closed with elements pending.
    Drain,
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlushTrigger::Capacity => "capacity",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Drain => "drain",
        };
        f.write_str(s)
    }
}

/// Hybrid size/time buffer stage.
pub struct BufferStage {
    capacity: usize,
    flush_interval: Duration,
    buffer: Vec<i64>,
    metrics: Arc<Metrics>,
}

impl BufferStage {
    /// Create a buffer stage. `capacity` and `flush_interval` must be non-zero.
    pub fn new(capacity: usize, flush_interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            capacity,
            flush_interval,
            buffer: Vec::with_capacity(capacity),
            metrics,
        }
    }

    /// Run until upstream closes, downstream goes away, or cancellation fires.
    pub async fn run(
        mut self,
        input: flume::Receiver<i64>,
        output: flume::Sender<i64>,
        token: CancellationToken,
    ) -> StageExit {
        let mut ticker = self.new_ticker();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.abandon();
                    return StageExit::Cancelled;
                }
                next = input.recv_async() => {
                    let Ok(value) = next else {
                        return self.drain(&output, &token).await;
                    };

                    self.buffer.push(value);
                    self.metrics.add_element_buffered();

                    if self.buffer.len() >= self.capacity {
                        let flushed = self.flush(FlushTrigger::Capacity, &output, &token).await;
                        if let Err(exit) = flushed {
                            return exit;
                        }
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => {
                    if self.buffer.is_empty() {
                        continue;
                    }
                    if let Err(exit) = self.flush(FlushTrigger::Timer, &output, &token).await {
                        return exit;
                    }
                    ticker.reset();
                }
            }
        }
    }

    fn new_ticker(&self) -> Interval {
        // interval() would complete its first tick immediately
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Final flush after upstream closed.
    async fn drain(&mut self, output: &flume::Sender<i64>, token: &CancellationToken) -> StageExit {
        if !self.buffer.is_empty() {
            if let Err(exit) = self.flush(FlushTrigger::Drain, output, token).await {
                return exit;
            }
        }
        tracing::debug!("Upstream closed, buffer stage finished");
        StageExit::Finished
    }

    /// Send every buffered element downstream in arrival order, then clear.
    async fn flush(
        &mut self,
        trigger: FlushTrigger,
        output: &flume::Sender<i64>,
        token: &CancellationToken,
    ) -> Result<(), StageExit> {
        let len = self.buffer.len();
        tracing::debug!("Flushing {} elements ({})", len, trigger);

        for (sent, &value) in self.buffer.iter().enumerate() {
            match handoff::send(output, value, token).await {
                Handoff::Delivered => {}
                Handoff::Cancelled => {
                    tracing::debug!("Cancelled during {} flush after {}/{}", trigger, sent, len);
                    self.metrics.add_elements_abandoned((len - sent) as u64);
                    return Err(StageExit::Cancelled);
                }
                Handoff::Closed => {
                    tracing::debug!("Sink dropped during {} flush", trigger);
                    self.metrics.add_elements_abandoned((len - sent) as u64);
                    return Err(StageExit::DownstreamClosed);
                }
            }
        }

        self.buffer.clear();
        self.metrics.add_flush(trigger);
        Ok(())
    }

    fn abandon(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!("Cancelled with {} buffered elements", self.buffer.len());
            self.metrics.add_elements_abandoned(self.buffer.len() as u64);
            self.buffer.clear();
        }
    }
}
