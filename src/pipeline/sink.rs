//! Output sink: prints every emitted element as `<label>: <value>`.

use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::pipeline::handoff::StageExit;
use crate::pipeline::Metrics;

/// Write every element of `input` to `writer` until the buffer stage closes.
///
/// Writes race cancellation so a stalled writer cannot hold up shutdown.
pub async fn run_sink<W>(
    input: flume::Receiver<i64>,
    mut writer: W,
    label: String,
    token: CancellationToken,
    metrics: Arc<Metrics>,
) -> StageExit
where
    W: AsyncWrite + Unpin,
{
    while let Ok(value) = input.recv_async().await {
        let line = format!("{}: {}\n", label, value);

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Sink cancelled while writing {}", value);
                return StageExit::Cancelled;
            }
            result = write_line(&mut writer, line.as_bytes()) => result,
        };

        if let Err(e) = written {
            tracing::warn!("Failed to write output: {}", e);
            metrics.add_failure();
            return StageExit::Failed;
        }

        metrics.add_element_emitted();
    }

    StageExit::Finished
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}
