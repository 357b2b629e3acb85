//! Cancellable rendezvous handoff shared by every stage.
//!
//! Each stage edge is a zero-capacity `flume` channel with a single producer:
//! a send completes only once the next stage is there to take the element.
//! The producer's `Sender` is moved into its stage task, so the channel
//! closes exactly once: when that task returns and drops it.

use tokio_util::sync::CancellationToken;

/// Create one stage edge.
pub fn channel<T>() -> (flume::Sender<T>, flume::Receiver<T>) {
    flume::bounded(0)
}

/// Outcome of a single send to the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The element is now owned by the next stage.
    Delivered,
    /// Cancellation fired while the send was pending.
    Cancelled,
    /// The next stage dropped its receiver.
    Closed,
}

/// Outcome of a single receive from the previous stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<T> {
    Item(T),
    Closed,
    Cancelled,
}

/// Why a stage stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// Upstream (or the input reader) ran out of elements.
    Finished,
    /// The source read the quit sentinel.
    QuitSentinel,
    /// Cancellation fired.
    Cancelled,
    /// The next stage went away before this one finished.
    DownstreamClosed,
    /// The reader or writer failed.
    Failed,
}

impl std::fmt::Display for StageExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageExit::Finished => "finished",
            StageExit::QuitSentinel => "quit sentinel",
            StageExit::Cancelled => "cancelled",
            StageExit::DownstreamClosed => "downstream closed",
            StageExit::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Send `value` downstream unless cancellation fires first.
///
/// An already-cancelled token never lets another element through. Once the
/// send is pending, a handoff the receiver has completed wins over a
/// cancellation that arrives in the same wakeup.
pub async fn send<T>(tx: &flume::Sender<T>, value: T, token: &CancellationToken) -> Handoff {
    if token.is_cancelled() {
        return Handoff::Cancelled;
    }

    tokio::select! {
        biased;
        result = tx.send_async(value) => match result {
            Ok(()) => Handoff::Delivered,
            Err(_) => Handoff::Closed,
        },
        _ = token.cancelled() => Handoff::Cancelled,
    }
}

/// Receive the next element unless cancellation fires first.
pub async fn recv<T>(rx: &flume::Receiver<T>, token: &CancellationToken) -> Inbound<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Inbound::Cancelled,
        next = rx.recv_async() => match next {
            Ok(item) => Inbound::Item(item),
            Err(_) => Inbound::Closed,
        },
    }
}
