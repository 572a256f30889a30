//! One direction of a framed stream.
//!
//! Each half owns its stream and refuses further use after a fatal error,
//! since the byte position can no longer be trusted.

use std::path::Path;

use squeeze_proto::{Cancel, Received, Sent, Source, Transfer};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::{Error, Result};

/// Outbound half.
#[derive(Debug)]
pub struct FrameSender<W> {
    /// Underlying stream.
    writer: W,
    /// Frame settings and cancellation.
    transfer: Transfer,
    /// Set after a fatal error.
    poisoned: bool,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W, transfer: Transfer) -> Self {
        Self {
            writer,
            transfer,
            poisoned: false,
        }
    }

    /// Sends one frame.
    pub async fn send(&mut self, body: impl Into<Source>) -> Result<Sent> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let result = self.transfer.send(&mut self.writer, body).await;
        result.map_err(|e| self.fail(e))
    }

    /// Flushes and shuts down the write direction.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        self.writer.shutdown().await?;
        Ok(())
    }

    /// The token that aborts this half.
    pub const fn cancel_token(&self) -> &Cancel {
        self.transfer.cancel_token()
    }

    /// Whether a fatal error disabled this half.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Records a failure, poisoning the half when it is fatal.
    fn fail(&mut self, e: squeeze_proto::Error) -> Error {
        if e.is_fatal() {
            warn!(error = %e, "sender poisoned");
            self.poisoned = true;
        }
        e.into()
    }
}

/// Inbound half.
#[derive(Debug)]
pub struct FrameReceiver<R> {
    /// Underlying stream.
    reader: R,
    /// Frame settings and cancellation.
    transfer: Transfer,
    /// Set after a fatal error.
    poisoned: bool,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Wraps `reader`.
    pub const fn new(reader: R, transfer: Transfer) -> Self {
        Self {
            reader,
            transfer,
            poisoned: false,
        }
    }

    /// Receives one frame into memory; `None` once the peer closed cleanly.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        self.check()?;
        let result = self.transfer.receive_bytes(&mut self.reader).await;
        result.map_err(|e| self.fail(e))
    }

    /// Receives one frame into `sink`.
    pub async fn recv_into<W>(&mut self, sink: &mut W) -> Result<Option<Received>>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.check()?;
        let result = self.transfer.receive_into(&mut self.reader, sink).await;
        result.map_err(|e| self.fail(e))
    }

    /// Receives one frame into the file at `dest`.
    pub async fn recv_file(&mut self, dest: &Path) -> Result<Option<Received>> {
        self.check()?;
        let result = self.transfer.receive_file(&mut self.reader, dest).await;
        result.map_err(|e| self.fail(e))
    }

    /// Whether a fatal error disabled this half.
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Refuses use after a fatal error.
    fn check(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Records a failure, poisoning the half when it is fatal.
    fn fail(&mut self, e: squeeze_proto::Error) -> Error {
        if e.is_fatal() {
            warn!(error = %e, "receiver poisoned");
            self.poisoned = true;
        }
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use squeeze_proto::{Config, Flag};
    use tokio::io::duplex;

    use super::*;

    fn transfer(config: Config) -> Transfer {
        Transfer::new(config).unwrap()
    }

    #[tokio::test]
    async fn halves_exchange_frames() {
        let (a, b) = duplex(4_096);
        let mut tx = FrameSender::new(a, transfer(Config::default()));
        let mut rx = FrameReceiver::new(b, transfer(Config::default()));

        let sent = tx.send("ping ".repeat(50)).await.unwrap();
        assert_eq!(sent.flag, Some(Flag::Compressed));
        tx.shutdown().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap(), "ping ".repeat(50).as_bytes());
        assert!(rx.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_send_does_not_poison() {
        let (a, b) = duplex(4_096);
        let mut tx = FrameSender::new(a, transfer(Config::default().max_frame_bytes(8)));
        let mut rx = FrameReceiver::new(b, transfer(Config::default()));

        let err = tx.send(vec![0xA5u8; 64]).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(!tx.is_poisoned());

        tx.send("ok").await.unwrap();
        tx.shutdown().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), b"ok");
    }

    #[tokio::test]
    async fn invalid_frame_poisons_receiver() {
        let (mut a, b) = duplex(64);
        let mut rx = FrameReceiver::new(b, transfer(Config::default()));

        a.write_all(&[3, 0, 0, 0, 9, 0, 0]).await.unwrap();
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, Error::Proto(squeeze_proto::Error::InvalidFrame(_))));
        assert!(rx.is_poisoned());
        assert!(matches!(rx.recv().await, Err(Error::Poisoned)));
    }

    #[tokio::test]
    async fn cancelled_sender_is_poisoned() {
        let (a, _b) = duplex(16);
        let cancel = Cancel::new();
        let mut tx = FrameSender::new(a, transfer(Config::default()).with_cancel(cancel.clone()));
        cancel.cancel();

        let err = tx.send("late").await.unwrap_err();
        assert!(matches!(err, Error::Proto(squeeze_proto::Error::Cancelled)));
        assert!(tx.is_poisoned());
        assert!(matches!(tx.shutdown().await, Err(Error::Poisoned)));
    }
}
