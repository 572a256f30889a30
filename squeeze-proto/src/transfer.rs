//! Send and receive whole frames, compression included.
//!
//! Per direction a stream cycles through
//! `AwaitingHeader → ReadingBody → (Decompressing) → Delivered`; frames
//! never overlap. Every entry point drains the current body before it
//! returns successfully, so the stream is left on the next header.

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::bounded::BoundedReader;
use crate::cancel::Cancel;
use crate::codec::Decompressor;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{self, Flag, FrameHeader, Layout};
use crate::select::{self, Body, Source};

/// Report of one frame written by [`Transfer::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Sent {
    /// Flag written, `None` for the plain layout.
    pub flag: Option<Flag>,
    /// Size of the source before compression.
    pub original_len: u64,
    /// Value of the length field.
    pub frame_len: u32,
}

/// Report of one frame consumed by [`Transfer::receive_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Received {
    /// Flag read, `None` for the plain layout.
    pub flag: Option<Flag>,
    /// Value of the length field.
    pub frame_len: u32,
    /// Bytes handed to the consumer after decompression.
    pub delivered: u64,
}

/// Where a body-reading step failed.
enum Failure {
    /// The stream or the decompressor; the connection is unusable.
    Stream(Error),
    /// The consumer; the stream can still be drained.
    Sink(io::Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Self::Stream(e)
    }
}

/// Frame transfer over borrowed streams.
///
/// Holds no stream state, so one value can drive any number of
/// independent connections concurrently. All entry points observe the
/// attached [`Cancel`] token.
#[derive(Debug, Clone, Default)]
pub struct Transfer {
    /// Shared tunables.
    config: Config,
    /// Aborts in-flight transfers.
    cancel: Cancel,
}

impl Transfer {
    /// Creates a transfer after validating `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Cancel::new(),
        })
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    /// The active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The token guarding this transfer.
    pub const fn cancel_token(&self) -> &Cancel {
        &self.cancel
    }

    /// Sends `source` as one frame and flushes `w`.
    ///
    /// With the flagged layout the body goes through the compression
    /// trial first. [`Error::PayloadTooLarge`] and [`Error::Source`] are
    /// raised before any byte is written, so the stream stays usable.
    pub async fn send<W>(&self, w: &mut W, source: impl Into<Source>) -> Result<Sent>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.cancel.guard(self.send_inner(w, source.into())).await
    }

    /// Receives one frame into `sink`.
    ///
    /// Returns `None` when the peer closed the stream on a frame boundary.
    /// If `sink` fails, the rest of the body is discarded and
    /// [`Error::Delivery`] is returned with the stream still aligned.
    pub async fn receive_into<R, W>(&self, r: &mut R, sink: &mut W) -> Result<Option<Received>>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.cancel.guard(self.receive_inner(r, sink)).await
    }

    /// Receives one frame into memory.
    pub async fn receive_bytes<R>(&self, r: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut body = Vec::new();
        Ok(self
            .receive_into(r, &mut body)
            .await?
            .map(|_| body))
    }

    /// Receives one frame into the file at `dest`.
    ///
    /// The body is written to a temporary file next to `dest` and renamed
    /// into place only once the whole frame arrived; on any failure the
    /// temporary file is removed and `dest` is untouched.
    pub async fn receive_file<R>(&self, r: &mut R, dest: &Path) -> Result<Option<Received>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = tempfile::NamedTempFile::new_in(dir)?;
        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);

        let Some(received) = self.receive_into(r, &mut file).await? else {
            return Ok(None);
        };
        file.sync_all().await.map_err(Error::Delivery)?;
        drop(file);
        temp.persist(dest).map_err(|e| Error::Delivery(e.error))?;
        Ok(Some(received))
    }

    /// Body of [`send`](Self::send), without the cancellation guard.
    async fn send_inner<W>(&self, w: &mut W, source: Source) -> Result<Sent>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (flag, original_len, body) = match self.config.layout {
            Layout::Flagged => {
                let choice = select::choose(source, &self.config).await?;
                (Some(choice.flag), choice.original_len, choice.body)
            }
            Layout::Plain => {
                let body = select::passthrough(source).await?;
                (None, body.len(), body)
            }
        };

        if flag == Some(Flag::Compressed) && original_len > self.config.max_decoded_bytes {
            return Err(Error::PayloadTooLarge {
                len: original_len,
                max: self.config.max_decoded_bytes,
            });
        }
        let header = FrameHeader::for_body(flag, body.len(), self.config.max_frame_bytes)?;
        frame::write_frame_header(w, &header).await?;

        let chunk = self.config.chunk_size;
        match body {
            Body::Memory(bytes) => {
                for piece in bytes.chunks(chunk) {
                    w.write_all(piece).await?;
                }
            }
            Body::File { mut file, len } => copy_exact(&mut file, w, len, chunk).await?,
            Body::Stream { mut reader, len } => copy_exact(&mut reader, w, len, chunk).await?,
        }
        w.flush().await?;

        let sent = Sent {
            flag,
            original_len,
            frame_len: header.length,
        };
        debug!(flag = ?sent.flag, original = sent.original_len, frame = sent.frame_len, "frame sent");
        Ok(sent)
    }

    /// Body of [`receive_into`](Self::receive_into), without the
    /// cancellation guard.
    async fn receive_inner<R, W>(&self, r: &mut R, sink: &mut W) -> Result<Option<Received>>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let Some(header) =
            frame::try_read_frame_header(r, self.config.layout, self.config.max_frame_bytes)
                .await?
        else {
            return Ok(None);
        };

        let mut body = BoundedReader::new(r, header.body_len());
        let outcome = match header.flag {
            Some(Flag::Compressed) => self.inflate(&mut body, sink).await,
            Some(Flag::Raw) | None => self.pass(&mut body, sink).await,
        };

        let delivered = match outcome {
            Ok(n) => n,
            Err(Failure::Stream(e)) => return Err(e),
            Err(Failure::Sink(e)) => {
                let discarded = body.drain().await?;
                debug!(discarded, error = %e, "consumer failed, frame discarded");
                return Err(Error::Delivery(e));
            }
        };

        let trailing = body.drain().await?;
        if trailing > 0 {
            trace!(trailing, "discarded bytes after compressed stream end");
        }
        sink.flush().await.map_err(Error::Delivery)?;

        let received = Received {
            flag: header.flag,
            frame_len: header.length,
            delivered,
        };
        debug!(flag = ?received.flag, frame = received.frame_len, delivered, "frame received");
        Ok(Some(received))
    }

    /// Copies a raw body to `sink`.
    async fn pass<R, W>(
        &self,
        body: &mut BoundedReader<'_, R>,
        sink: &mut W,
    ) -> std::result::Result<u64, Failure>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut delivered = 0;
        loop {
            let n = body.read(&mut buf).await.map_err(Error::from)?;
            if n == 0 {
                return Ok(delivered);
            }
            sink.write_all(&buf[..n]).await.map_err(Failure::Sink)?;
            delivered += n as u64;
        }
    }

    /// Streams a compressed body through the decompressor into `sink`.
    ///
    /// Stops as soon as the compressed stream ends; the caller drains
    /// whatever the decompressor left unread.
    async fn inflate<R, W>(
        &self,
        body: &mut BoundedReader<'_, R>,
        sink: &mut W,
    ) -> std::result::Result<u64, Failure>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let chunk = self.config.chunk_size;
        let mut inflater = Decompressor::new(self.config.algorithm);
        let mut input = vec![0u8; chunk];
        let mut out = Vec::with_capacity(chunk);
        let (mut pos, mut filled, mut eof) = (0, 0, false);
        let mut delivered = 0;

        while !inflater.is_finished() {
            if pos == filled && !eof {
                filled = body.read(&mut input).await.map_err(Error::from)?;
                pos = 0;
                eof = filled == 0;
            }

            out.clear();
            let step = inflater.decompress(&input[pos..filled], &mut out)?;
            pos += step.consumed;
            if !out.is_empty() {
                delivered += out.len() as u64;
                if delivered > self.config.max_decoded_bytes {
                    return Err(Error::CorruptCompressedData(format!(
                        "decompressed body exceeds {} bytes",
                        self.config.max_decoded_bytes
                    ))
                    .into());
                }
                sink.write_all(&out).await.map_err(Failure::Sink)?;
            }

            if step.consumed == 0 && step.produced == 0 && (eof || pos < filled) {
                return Err(Error::CorruptCompressedData(
                    "compressed body ended before the compressed stream".into(),
                )
                .into());
            }
        }
        Ok(delivered)
    }
}

/// Copies exactly `len` bytes from a local source to the stream.
async fn copy_exact<R, W>(src: &mut R, w: &mut W, len: u64, chunk: usize) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk];
    let mut left = len;
    while left > 0 {
        let want = usize::try_from(left).map_or(buf.len(), |l| l.min(buf.len()));
        let n = src.read(&mut buf[..want]).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended {left} bytes short of its declared length"),
            )));
        }
        w.write_all(&buf[..n]).await?;
        left -= n as u64;
    }
    Ok(())
}
