//! Dedicated writer task draining the outbound queue.
//!
//! ```text
//! Outbox ─► Drain ─► writer task ─► FrameSender ─► stream
//! ```
//!
//! The task is the single consumer of its queue, so frames reach the
//! stream in enqueue order and never interleave.

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::conn::FrameSender;
use crate::error::Result;
use crate::queue::Drain;

/// Spawns a task that sends every queued body until the queue completes,
/// then shuts the stream down.
///
/// Resolves to the number of frames written. A body that cannot be framed
/// (too large for the frame limit, or a file that cannot be read) is
/// skipped with a warning. A fatal
/// error closes the queue, so pending producers see
/// [`Error::QueueClosed`](crate::Error::QueueClosed), and ends the task.
pub fn spawn_writer<W>(sender: FrameSender<W>, drain: Drain) -> JoinHandle<Result<u64>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run(sender, drain))
}

/// Body of the writer task.
async fn run<W>(mut sender: FrameSender<W>, mut drain: Drain) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = 0u64;
    loop {
        let waited = sender
            .cancel_token()
            .guard(async { Ok::<_, squeeze_proto::Error>(drain.next().await) })
            .await;
        let next = match waited {
            Ok(next) => next,
            Err(e) => {
                drain.close();
                return Err(e.into());
            }
        };
        let Some(body) = next else { break };

        match sender.send(body).await {
            Ok(_) => frames += 1,
            Err(e) if !e.is_fatal() => warn!(error = %e, "skipping unsendable body"),
            Err(e) => {
                drain.close();
                return Err(e);
            }
        }
    }
    sender.shutdown().await?;
    debug!(frames, "writer finished");
    Ok(frames)
}
