//! Transfer configuration shared by both directions of a stream.

use serde::{Deserialize, Serialize};

use crate::codec::{Algorithm, DEFAULT_LEVEL};
use crate::error::{Error, Result};
use crate::frame::{DEFAULT_MAX_FRAME_BYTES, Layout};

/// Default I/O chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default size above which the compression trial spools to disk (8 MiB).
pub const DEFAULT_SPOOL_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Default ceiling on a decompressed body (1 GiB).
pub const DEFAULT_MAX_DECODED_BYTES: u64 = 1024 * 1024 * 1024;

/// Largest accepted `chunk_size` (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Tunables for [`Transfer`](crate::Transfer).
///
/// Every field has a default, so a partial JSON document is a valid config:
///
/// ```
/// let cfg: squeeze_proto::Config = serde_json::from_str(r#"{ "level": 9 }"#).unwrap();
/// assert_eq!(cfg.level, 9);
/// assert_eq!(cfg.chunk_size, squeeze_proto::DEFAULT_CHUNK_SIZE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
    /// Ceiling on the length field, enforced on send and receive.
    pub max_frame_bytes: u32,
    /// Ceiling on the size of a body after decompression, enforced on
    /// send and receive.
    pub max_decoded_bytes: u64,
    /// Buffer size for streaming copies and codec steps.
    pub chunk_size: usize,
    /// Trial compression of larger sources goes to a temporary file.
    pub spool_threshold: u64,
    /// Algorithm used for compressed frames.
    pub algorithm: Algorithm,
    /// Compression level, `0..=9`.
    pub level: u32,
    /// Header layout.
    pub layout: Layout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            algorithm: Algorithm::default(),
            level: DEFAULT_LEVEL,
            layout: Layout::default(),
        }
    }
}

impl Config {
    /// Sets the frame length ceiling.
    #[must_use]
    pub const fn max_frame_bytes(mut self, max: u32) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Sets the decompressed body ceiling.
    #[must_use]
    pub const fn max_decoded_bytes(mut self, max: u64) -> Self {
        self.max_decoded_bytes = max;
        self
    }

    /// Sets the streaming chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the in-memory limit for the compression trial.
    #[must_use]
    pub const fn spool_threshold(mut self, bytes: u64) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Sets the compression algorithm.
    #[must_use]
    pub const fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the compression level.
    #[must_use]
    pub const fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Sets the header layout.
    #[must_use]
    pub const fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Rejects values no transfer can work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} exceeds the {MAX_CHUNK_SIZE} byte limit",
                self.chunk_size
            )));
        }
        if self.max_decoded_bytes == 0 {
            return Err(Error::InvalidConfig("max_decoded_bytes must be positive".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(Error::InvalidConfig("max_frame_bytes must be positive".into()));
        }
        if self.level > 9 {
            return Err(Error::InvalidConfig(format!(
                "compression level {} is outside 0..=9",
                self.level
            )));
        }
        Ok(())
    }
}
