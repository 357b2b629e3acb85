//! Source stage: turns text lines into integers.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::pipeline::handoff::{self, Handoff, StageExit};
use crate::pipeline::Metrics;

/// Settings for the source stage.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Line that ends the input
    pub quit_sentinel: String,
    /// Diagnostic shown to the user for a line that is not an integer
    pub invalid_input_message: String,
}

/// Read lines from `reader` and send every integer to `output`.
///
/// Stops on end of input, the quit sentinel, a read error, or cancellation.
/// A line is matched and parsed exactly as read, minus its `\n` or `\r\n`
/// terminator. Malformed lines are reported on stderr and skipped. `output`
/// is dropped when this returns, which closes the channel for the next stage.
pub async fn run_source_stage<R>(
    reader: R,
    output: flume::Sender<i64>,
    token: CancellationToken,
    settings: SourceSettings,
    metrics: Arc<Metrics>,
) -> StageExit
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        // next_line is cancel safe, so losing the race drops no data
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Source cancelled while waiting for input");
                return StageExit::Cancelled;
            }
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Source reached end of input");
                return StageExit::Finished;
            }
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                metrics.add_failure();
                return StageExit::Failed;
            }
        };

        metrics.add_line_read();

        if line == settings.quit_sentinel {
            tracing::debug!("Source received quit sentinel");
            return StageExit::QuitSentinel;
        }

        let value = match line.parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                metrics.add_malformed_line();
                tracing::warn!("Skipping malformed input {:?}: {}", line, e);
                eprintln!("{}", settings.invalid_input_message);
                continue;
            }
        };

        metrics.add_element_parsed();

        match handoff::send(&output, value, &token).await {
            Handoff::Delivered => {}
            Handoff::Cancelled => {
                tracing::debug!("Source cancelled while sending {}", value);
                return StageExit::Cancelled;
            }
            Handoff::Closed => {
                tracing::debug!("Filter stage dropped, stopping source");
                return StageExit::DownstreamClosed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn settings() -> SourceSettings {
        SourceSettings {
            quit_sentinel: "q".to_string(),
            invalid_input_message: "bad input".to_string(),
        }
    }

    async fn collect(rx: flume::Receiver<i64>) -> Vec<i64> {
        let mut out = Vec::new();
        while let Ok(v) = rx.recv_async().await {
            out.push(v);
        }
        out
    }

    #[tokio::test]
    async fn test_stops_at_sentinel() {
        let input: &[u8] = b"1\n-2\n3\nq\n4\n";
        let (tx, rx) = handoff::channel();
        let metrics = Metrics::new();

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            CancellationToken::new(),
            settings(),
            metrics.clone(),
        ));

        assert_eq!(collect(rx).await, vec![1, -2, 3]);
        assert_eq!(handle.await.unwrap(), StageExit::QuitSentinel);
        assert_eq!(metrics.lines_read.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_end_of_input_without_sentinel() {
        let input: &[u8] = b"6\n9";
        let (tx, rx) = handoff::channel();

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            CancellationToken::new(),
            settings(),
            Metrics::new(),
        ));

        assert_eq!(collect(rx).await, vec![6, 9]);
        assert_eq!(handle.await.unwrap(), StageExit::Finished);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let input: &[u8] = b"abc\n12\n\n1.5\n 15 \n15\r\n99999999999999999999\nq\n";
        let (tx, rx) = handoff::channel();
        let metrics = Metrics::new();

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            CancellationToken::new(),
            settings(),
            metrics.clone(),
        ));

        assert_eq!(collect(rx).await, vec![12, 15]);
        assert_eq!(handle.await.unwrap(), StageExit::QuitSentinel);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.malformed_lines, 5);
        assert_eq!(snapshot.elements_parsed, 2);
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_is_not_trimmed() {
        let input: &[u8] = b" 3 \n\t6\nq \n9\n";
        let (tx, rx) = handoff::channel();
        let metrics = Metrics::new();

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            CancellationToken::new(),
            settings(),
            metrics.clone(),
        ));

        // "q " is not the sentinel, so the source runs to end of input.
        assert_eq!(collect(rx).await, vec![9]);
        assert_eq!(handle.await.unwrap(), StageExit::Finished);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lines_read, 4);
        assert_eq!(snapshot.malformed_lines, 3);
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_for_input() {
        // The write half stays open, so the reader never sees end of input.
        let (_writer, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        let (tx, rx) = handoff::channel();
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_source_stage(
            reader,
            tx,
            token.clone(),
            settings(),
            Metrics::new(),
        ));

        token.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("source should stop after cancellation")
            .unwrap();

        assert_eq!(exit, StageExit::Cancelled);
        assert!(rx.recv_async().await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_while_sending() {
        let input: &[u8] = b"1\n2\n3\n";
        let (tx, rx) = handoff::channel();
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            token.clone(),
            settings(),
            Metrics::new(),
        ));

        // Nobody receives, so the first send blocks until cancellation.
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("source should stop after cancellation")
            .unwrap();

        assert_eq!(exit, StageExit::Cancelled);
        assert!(rx.recv_async().await.is_err());
    }

    #[tokio::test]
    async fn test_custom_sentinel() {
        let input: &[u8] = b"3\nexit\n6\n";
        let (tx, rx) = handoff::channel();
        let settings = SourceSettings {
            quit_sentinel: "exit".to_string(),
            invalid_input_message: String::new(),
        };

        let handle = tokio::spawn(run_source_stage(
            input,
            tx,
            CancellationToken::new(),
            settings,
            Metrics::new(),
        ));

        assert_eq!(collect(rx).await, vec![3]);
        assert_eq!(handle.await.unwrap(), StageExit::QuitSentinel);
    }
}
