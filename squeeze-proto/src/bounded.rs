//! Read-only view over exactly one frame body.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::Result;

/// Scratch buffer size used by [`BoundedReader::drain`].
const DRAIN_BUF: usize = 8 * 1024;

/// Clamps reads from a borrowed stream to the bytes left in one frame body.
///
/// Once `remaining` reaches zero every read reports end-of-data without
/// polling the underlying stream, so a greedy consumer (a decompressor, a
/// buffered copy) cannot pull bytes of the next frame header.
///
/// The underlying stream is borrowed, never closed.
#[derive(Debug)]
pub struct BoundedReader<'a, R: ?Sized> {
    /// The raw stream, positioned inside the current body.
    inner: &'a mut R,
    /// Body bytes not yet handed out.
    remaining: u64,
}

impl<'a, R: AsyncRead + Unpin + ?Sized> BoundedReader<'a, R> {
    /// Wraps `inner` for a body of `remaining` bytes.
    pub const fn new(inner: &'a mut R, remaining: u64) -> Self {
        Self { inner, remaining }
    }

    /// Body bytes not yet consumed.
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Reads and discards the rest of the body, returning how many bytes
    /// were thrown away.
    pub async fn drain(&mut self) -> Result<u64> {
        let mut scratch = [0u8; DRAIN_BUF];
        let mut discarded = 0;
        while self.remaining > 0 {
            discarded += self.read(&mut scratch).await? as u64;
        }
        Ok(discarded)
    }
}

impl<R: AsyncRead + Unpin + ?Sized> AsyncRead for BoundedReader<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let max = usize::try_from(this.remaining).map_or(buf.remaining(), |r| r.min(buf.remaining()));
        let mut limited = ReadBuf::new(buf.initialize_unfilled_to(max));
        ready!(Pin::new(&mut *this.inner).poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        if n == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {} body bytes outstanding", this.remaining),
            )));
        }

        buf.advance(n);
        this.remaining -= n as u64;
        Poll::Ready(Ok(()))
    }
}
