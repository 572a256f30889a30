//! TCP client that streams queued bodies to a squeeze server.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use squeeze_proto::{Cancel, Config, Source, Transfer};
use tokio::io::BufWriter;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::info;

use crate::conn::FrameSender;
use crate::error::Result;
use crate::queue::{Outbox, outbox};
use crate::writer::spawn_writer;

/// A connection with a background writer fed by a bounded queue.
#[derive(Debug)]
pub struct Client {
    /// Producer handle owned by the client.
    outbox: Outbox,
    /// Writer task draining the queue.
    writer: JoinHandle<Result<u64>>,
    /// Remote address.
    peer: SocketAddr,
}

impl Client {
    /// Connects to `addr`; at most `capacity` bodies wait in the queue.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: Config,
        capacity: usize,
        cancel: Cancel,
    ) -> Result<Self> {
        let transfer = Transfer::new(config)?.with_cancel(cancel);
        let (outbox, drain) = outbox(capacity)?;

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!(%peer, "connected");

        let sender = FrameSender::new(BufWriter::new(stream), transfer);
        Ok(Self {
            outbox,
            writer: spawn_writer(sender, drain),
            peer,
        })
    }

    /// Remote address.
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Another producer handle for the same queue.
    ///
    /// [`finish`](Self::finish) waits until every handed-out producer is
    /// completed or dropped.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Queues one body, waiting while the queue is full.
    pub async fn enqueue(&self, body: impl Into<Source>) -> Result<()> {
        self.outbox.enqueue(body).await
    }

    /// Queues the file at `path` as one frame.
    pub async fn send_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.outbox.enqueue(Source::File(path.into())).await
    }

    /// Completes the queue, waits for the writer to drain it and closes
    /// the write direction. Returns the number of frames sent.
    pub async fn finish(self) -> Result<u64> {
        self.outbox.complete();
        let frames = self.writer.await.map_err(io::Error::other)??;
        info!(peer = %self.peer, frames, "finished");
        Ok(frames)
    }
}
