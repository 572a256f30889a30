//! Per-frame choice between the raw and the compressed representation.
//!
//! The whole source is compressed once into a side buffer (memory, or an
//! anonymous temporary file above `spool_threshold`) and the
//! smaller of the two is sent. Ties go to raw. The trial stops as soon as
//! the compressed output reaches the source size.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::codec::Compressor;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::Flag;

/// Something that can be sent as one frame body.
#[non_exhaustive]
pub enum Source {
    /// An in-memory buffer.
    Bytes(Vec<u8>),
    /// A regular file; its length is taken from metadata.
    File(PathBuf),
    /// A reader of known length. Not trial-compressed: always sent raw.
    Stream {
        /// Body bytes.
        reader: Box<dyn AsyncRead + Send + Unpin>,
        /// Exact number of bytes `reader` yields.
        len: u64,
    },
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::File(p) => f.debug_tuple("File").field(p).finish(),
            Self::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

impl From<Vec<u8>> for Source {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Source {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

/// The representation picked for transmission.
pub enum Body {
    /// Bytes held in memory.
    Memory(Vec<u8>),
    /// A file positioned at its start: the original, or the spool.
    File {
        /// Open handle; a spool is deleted when this is dropped.
        file: File,
        /// Bytes to send from `file`.
        len: u64,
    },
    /// A reader passed through untouched.
    Stream {
        /// Body bytes.
        reader: Box<dyn AsyncRead + Send + Unpin>,
        /// Bytes to send from `reader`.
        len: u64,
    },
}

impl Body {
    /// Body length on the wire.
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(b) => b.len() as u64,
            Self::File { len, .. } | Self::Stream { len, .. } => *len,
        }
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Memory(_) => "Memory",
            Self::File { .. } => "File",
            Self::Stream { .. } => "Stream",
        };
        f.debug_struct(kind).field("len", &self.len()).finish()
    }
}

/// Outcome of [`choose`].
#[derive(Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct Choice {
    /// Flag to put in the header.
    pub flag: Flag,
    /// Size of the source before compression.
    pub original_len: u64,
    /// What to send.
    pub body: Body,
}

/// The decision rule: compressed only when strictly smaller.
pub const fn decide(original_len: u64, compressed_len: u64) -> Flag {
    if compressed_len < original_len {
        Flag::Compressed
    } else {
        Flag::Raw
    }
}

/// Picks the smaller representation of `source`.
pub async fn choose(source: Source, config: &Config) -> Result<Choice> {
    match source {
        Source::Bytes(data) => choose_bytes(data, config).await,
        Source::File(path) => {
            let file = File::open(&path).await.map_err(Error::Source)?;
            choose_file(file, config).await
        }
        Source::Stream { reader, len } => Ok(Choice {
            flag: Flag::Raw,
            original_len: len,
            body: Body::Stream { reader, len },
        }),
    }
}

/// Opens `source` as-is, with no compression trial.
pub async fn passthrough(source: Source) -> Result<Body> {
    Ok(match source {
        Source::Bytes(data) => Body::Memory(data),
        Source::File(path) => {
            let file = File::open(&path).await.map_err(Error::Source)?;
            let len = file.metadata().await.map_err(Error::Source)?.len();
            Body::File { file, len }
        }
        Source::Stream { reader, len } => Body::Stream { reader, len },
    })
}

/// Runs the trial for an in-memory buffer on the blocking pool.
async fn choose_bytes(data: Vec<u8>, config: &Config) -> Result<Choice> {
    let (algorithm, level, chunk) = (config.algorithm, config.level, config.chunk_size);
    let (data, packed) = tokio::task::spawn_blocking(move || {
        let mut c = Compressor::new(algorithm, level);
        let packed = trial(&mut c, &data, chunk);
        (data, packed)
    })
    .await
    .map_err(|e| Error::Source(io::Error::other(e)))?;

    let original_len = data.len() as u64;
    Ok(match packed? {
        Some(packed) if decide(original_len, packed.len() as u64) == Flag::Compressed => Choice {
            flag: Flag::Compressed,
            original_len,
            body: Body::Memory(packed),
        },
        _ => Choice {
            flag: Flag::Raw,
            original_len,
            body: Body::Memory(data),
        },
    })
}

/// Compresses `data` chunk by chunk; `None` once the output reaches the
/// input size.
fn trial(c: &mut Compressor, data: &[u8], chunk: usize) -> Result<Option<Vec<u8>>> {
    let limit = data.len();
    let mut out = Vec::new();
    for piece in data.chunks(chunk) {
        c.update(piece, &mut out)?;
        if out.len() >= limit {
            return Ok(None);
        }
    }
    c.finish(&mut out)?;
    Ok(Some(out))
}

/// Side buffer for a file trial.
enum Spool {
    /// Compressed bytes kept in memory.
    Memory(Vec<u8>),
    /// Anonymous temp file; the OS reclaims it once the handle closes.
    Disk(File),
}

/// Runs the trial for a file, rewinding it when raw wins.
async fn choose_file(mut file: File, config: &Config) -> Result<Choice> {
    let original_len = file.metadata().await.map_err(Error::Source)?.len();
    let mut spool = if original_len > config.spool_threshold {
        Spool::Disk(File::from_std(tempfile::tempfile().map_err(Error::Source)?))
    } else {
        Spool::Memory(Vec::new())
    };

    let mut c = Compressor::new(config.algorithm, config.level);
    let mut input = vec![0u8; config.chunk_size];
    let mut pending = Vec::new();
    let mut left = original_len;
    let mut gave_up = false;

    while left > 0 {
        let want = usize::try_from(left).map_or(input.len(), |l| l.min(input.len()));
        let n = file.read(&mut input[..want]).await.map_err(Error::Source)?;
        if n == 0 {
            return Err(Error::Source(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank during compression trial",
            )));
        }
        left -= n as u64;
        c.update(&input[..n], &mut pending)?;
        if c.total_out() >= original_len {
            gave_up = true;
            break;
        }
        spill(&mut spool, &mut pending).await?;
    }
    if !gave_up {
        c.finish(&mut pending)?;
        spill(&mut spool, &mut pending).await?;
    }

    let compressed_len = c.total_out();
    if gave_up || decide(original_len, compressed_len) == Flag::Raw {
        file.seek(SeekFrom::Start(0)).await.map_err(Error::Source)?;
        return Ok(Choice {
            flag: Flag::Raw,
            original_len,
            body: Body::File {
                file,
                len: original_len,
            },
        });
    }

    let body = match spool {
        Spool::Memory(packed) => Body::Memory(packed),
        Spool::Disk(mut spooled) => {
            spooled.flush().await.map_err(Error::Source)?;
            spooled.seek(SeekFrom::Start(0)).await.map_err(Error::Source)?;
            Body::File {
                file: spooled,
                len: compressed_len,
            }
        }
    };
    Ok(Choice {
        flag: Flag::Compressed,
        original_len,
        body,
    })
}

/// Moves freshly compressed bytes into the side buffer.
async fn spill(spool: &mut Spool, pending: &mut Vec<u8>) -> Result<()> {
    match spool {
        Spool::Memory(buf) => buf.append(pending),
        Spool::Disk(file) => {
            file.write_all(pending).await.map_err(Error::Source)?;
            pending.clear();
        }
    }
    Ok(())
}
