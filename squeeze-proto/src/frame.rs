//! Length-prefixed frame codec over any `AsyncRead`/`AsyncWrite` stream.
//!
//! Each frame is: `[u32 little-endian length][flag][body]`. The length
//! counts the flag byte and the body. The [`Layout::Plain`] variant drops
//! the flag byte, so its length counts the body alone.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the length field in bytes.
pub const LENGTH_FIELD: usize = 4;

/// Largest header any layout produces (length field + flag byte).
pub const MAX_HEADER_LEN: usize = LENGTH_FIELD + 1;

/// Default ceiling on the length field (256 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

/// Compression indicator carried in the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
#[allow(clippy::exhaustive_enums)]
pub enum Flag {
    /// Body is stored as-is.
    Raw = 0,
    /// Body is compressed with the configured algorithm.
    Compressed = 1,
}

impl TryFrom<u8> for Flag {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Compressed),
            other => Err(Error::invalid(format!("unknown flag byte {other:#04x}"))),
        }
    }
}

/// Header layout shared by both peers of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Layout {
    /// `[length][flag][body]`, the length counting flag and body.
    #[default]
    Flagged,
    /// `[length][body]`, always raw.
    Plain,
}

impl Layout {
    /// Header size for this layout.
    pub const fn header_len(self) -> usize {
        match self {
            Self::Flagged => MAX_HEADER_LEN,
            Self::Plain => LENGTH_FIELD,
        }
    }
}

/// A parsed or about-to-be-written frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct FrameHeader {
    /// Value of the length field.
    pub length: u32,
    /// Flag byte, absent in the plain layout.
    pub flag: Option<Flag>,
}

impl FrameHeader {
    /// Builds the header for a body of `body_len` bytes.
    ///
    /// Fails with [`Error::PayloadTooLarge`] when the resulting length does
    /// not fit in the length field or exceeds `max_frame_bytes`.
    pub fn for_body(flag: Option<Flag>, body_len: u64, max_frame_bytes: u32) -> Result<Self> {
        let length = body_len + u64::from(flag.is_some());
        if length == 0 {
            return Err(Error::EmptyFrame);
        }
        let max = u64::from(max_frame_bytes);
        if length > max {
            return Err(Error::PayloadTooLarge { len: length, max });
        }
        let length = u32::try_from(length).map_err(|_| Error::PayloadTooLarge {
            len: length,
            max: u64::from(u32::MAX),
        })?;
        Ok(Self { length, flag })
    }

    /// Number of body bytes following the header.
    pub fn body_len(&self) -> u64 {
        u64::from(self.length) - u64::from(self.flag.is_some())
    }

    /// Encodes the header, returning the buffer and the number of bytes used.
    pub fn encode(&self) -> ([u8; MAX_HEADER_LEN], usize) {
        let mut buf = [0u8; MAX_HEADER_LEN];
        buf[..LENGTH_FIELD].copy_from_slice(&self.length.to_le_bytes());
        match self.flag {
            Some(flag) => {
                buf[LENGTH_FIELD] = flag as u8;
                (buf, MAX_HEADER_LEN)
            }
            None => (buf, LENGTH_FIELD),
        }
    }
}

/// Validates a raw length field against the domain `1..=max_frame_bytes`.
pub fn decode_length(raw: [u8; LENGTH_FIELD], max_frame_bytes: u32) -> Result<u32> {
    let length = u32::from_le_bytes(raw);
    if length == 0 {
        return Err(Error::invalid("zero frame length"));
    }
    if length > max_frame_bytes {
        return Err(Error::invalid(format!(
            "frame length {length} exceeds limit of {max_frame_bytes}"
        )));
    }
    Ok(length)
}

/// Writes a frame header. Does not flush.
pub async fn write_frame_header<W>(w: &mut W, header: &FrameHeader) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (buf, len) = header.encode();
    w.write_all(&buf[..len]).await?;
    Ok(())
}

/// Writes a complete in-memory frame. Does not flush.
pub async fn write_frame<W>(
    w: &mut W,
    flag: Option<Flag>,
    body: &[u8],
    max_frame_bytes: u32,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = FrameHeader::for_body(flag, body.len() as u64, max_frame_bytes)?;
    write_frame_header(w, &header).await?;
    w.write_all(body).await?;
    Ok(())
}

/// Reads and validates a frame header.
///
/// A peer that closes anywhere inside the header, including before its
/// first byte, yields [`Error::ConnectionClosed`].
pub async fn read_frame_header<R>(
    r: &mut R,
    layout: Layout,
    max_frame_bytes: u32,
) -> Result<FrameHeader>
where
    R: AsyncRead + Unpin + ?Sized,
{
    try_read_frame_header(r, layout, max_frame_bytes)
        .await?
        .ok_or(Error::ConnectionClosed)
}

/// Like [`read_frame_header`], but returns `None` when the peer closed the
/// stream cleanly on a frame boundary.
pub async fn try_read_frame_header<R>(
    r: &mut R,
    layout: Layout,
    max_frame_bytes: u32,
) -> Result<Option<FrameHeader>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; LENGTH_FIELD];
    let mut filled = 0;
    while filled < LENGTH_FIELD {
        match r.read(&mut raw[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(Error::ConnectionClosed),
            n => filled += n,
        }
    }
    let length = decode_length(raw, max_frame_bytes)?;

    let flag = match layout {
        Layout::Flagged => Some(Flag::try_from(r.read_u8().await?)?),
        Layout::Plain => None,
    };
    Ok(Some(FrameHeader { length, flag }))
}
