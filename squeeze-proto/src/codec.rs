//! Chunked compression transforms backed by `flate2`.
//!
//! Both sides work on caller-sized chunks so a frame body never has to be
//! materialized in full.

use std::io;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Spare output capacity reserved before each compressor step.
const OUT_RESERVE: usize = 16 * 1024;

/// Compression algorithm applied to flagged frame bodies.
///
/// Both peers must agree on the algorithm; it is not carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Algorithm {
    /// DEFLATE with the zlib header and Adler-32 trailer.
    #[default]
    Zlib,
    /// Raw DEFLATE stream, no header or checksum.
    Deflate,
}

impl Algorithm {
    /// Whether the stream carries the zlib wrapper.
    const fn zlib_header(self) -> bool {
        matches!(self, Self::Zlib)
    }
}

/// Streaming compressor fed one chunk at a time.
#[derive(Debug)]
pub struct Compressor {
    /// Underlying deflate state.
    inner: Compress,
}

impl Compressor {
    /// Creates a compressor; `level` is clamped to `0..=9`.
    pub fn new(algorithm: Algorithm, level: u32) -> Self {
        Self {
            inner: Compress::new(Compression::new(level.min(9)), algorithm.zlib_header()),
        }
    }

    /// Compresses `input`, appending whatever output is ready to `out`.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.run(input, out, FlushCompress::None)
    }

    /// Flushes the trailer. The compressor must not be used afterwards.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.run(&[], out, FlushCompress::Finish)
    }

    /// Total compressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.inner.total_out()
    }

    /// Drives the deflate state until `input` is consumed (or the stream
    /// ends when finishing).
    fn run(&mut self, mut input: &[u8], out: &mut Vec<u8>, flush: FlushCompress) -> Result<()> {
        loop {
            out.reserve(OUT_RESERVE);
            let before = self.inner.total_in();
            let status = self
                .inner
                .compress_vec(input, out, flush)
                .map_err(io::Error::other)?;
            input = &input[consumed(before, self.inner.total_in())..];

            if status == Status::StreamEnd {
                return Ok(());
            }
            // Without a flush request, an unfilled output means deflate
            // took everything it was given.
            if flush == FlushCompress::None && input.is_empty() && out.len() < out.capacity() {
                return Ok(());
            }
        }
    }
}

/// Outcome of one [`Decompressor::decompress`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Step {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes appended.
    pub produced: usize,
}

/// Streaming decompressor that never writes past the output's capacity.
#[derive(Debug)]
pub struct Decompressor {
    /// Underlying inflate state.
    inner: Decompress,
    /// Set once the end of the compressed stream was seen.
    finished: bool,
}

impl Decompressor {
    /// Creates a decompressor for `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            inner: Decompress::new(algorithm.zlib_header()),
            finished: false,
        }
    }

    /// Whether the compressed stream has ended.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Inflates from `input` into the spare capacity of `out`.
    ///
    /// Call with an empty `input` to flush output the previous step had no
    /// room for. Malformed input yields [`Error::CorruptCompressedData`].
    pub fn decompress(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<Step> {
        if self.finished {
            return Ok(Step {
                consumed: 0,
                produced: 0,
            });
        }
        let (in_before, out_before) = (self.inner.total_in(), out.len());
        let status = self
            .inner
            .decompress_vec(input, out, FlushDecompress::None)
            .map_err(|e| Error::CorruptCompressedData(e.to_string()))?;
        if status == Status::StreamEnd {
            self.finished = true;
        }
        Ok(Step {
            consumed: consumed(in_before, self.inner.total_in()),
            produced: out.len() - out_before,
        })
    }
}

/// Difference between two monotonically growing byte counters.
#[allow(clippy::cast_possible_truncation)]
const fn consumed(before: u64, after: u64) -> usize {
    (after - before) as usize
}

/// Compresses a whole buffer; used by tests and small in-memory callers.
pub fn compress_to_vec(data: &[u8], algorithm: Algorithm, level: u32) -> Result<Vec<u8>> {
    let mut c = Compressor::new(algorithm, level);
    let mut out = Vec::with_capacity(data.len() / 2);
    c.update(data, &mut out)?;
    c.finish(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inflates `data` through a deliberately small output window.
    fn inflate_all(data: &[u8], algorithm: Algorithm, window: usize) -> Result<Vec<u8>> {
        let mut d = Decompressor::new(algorithm);
        let mut result = Vec::new();
        let mut out = Vec::with_capacity(window);
        let mut pos = 0;
        while !d.is_finished() {
            out.clear();
            let step = d.decompress(&data[pos..], &mut out)?;
            pos += step.consumed;
            result.extend_from_slice(&out);
            if step.consumed == 0 && step.produced == 0 {
                return Err(Error::CorruptCompressedData("truncated".into()));
            }
        }
        Ok(result)
    }

    #[test]
    fn chunked_compression_matches_input() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(2_000);
        let mut c = Compressor::new(Algorithm::Zlib, DEFAULT_LEVEL);
        let mut out = Vec::new();
        for chunk in text.as_bytes().chunks(1_000) {
            c.update(chunk, &mut out).unwrap();
        }
        c.finish(&mut out).unwrap();
        assert_eq!(c.total_out(), out.len() as u64);
        assert!(out.len() < text.len() / 10);

        let back = inflate_all(&out, Algorithm::Zlib, 512).unwrap();
        assert_eq!(back, text.as_bytes());
    }

    #[test]
    fn raw_deflate_roundtrip() {
        let data = vec![42u8; 100_000];
        let packed = compress_to_vec(&data, Algorithm::Deflate, 9).unwrap();
        let back = inflate_all(&packed, Algorithm::Deflate, 4_096).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn empty_input_still_produces_a_stream() {
        let packed = compress_to_vec(&[], Algorithm::Zlib, DEFAULT_LEVEL).unwrap();
        assert!(!packed.is_empty());
        assert!(inflate_all(&packed, Algorithm::Zlib, 64).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = inflate_all(&[0xFF; 32], Algorithm::Zlib, 64).unwrap_err();
        assert!(matches!(err, Error::CorruptCompressedData(_)));
    }

    #[test]
    fn truncated_stream_never_finishes() {
        let packed = compress_to_vec(&[7u8; 10_000], Algorithm::Zlib, DEFAULT_LEVEL).unwrap();
        let err = inflate_all(&packed[..packed.len() - 4], Algorithm::Zlib, 64 * 1024);
        assert!(matches!(err, Err(Error::CorruptCompressedData(_))));
    }

    #[test]
    fn algorithms_are_not_interchangeable() {
        let packed = compress_to_vec(b"hello hello hello", Algorithm::Deflate, 6).unwrap();
        assert!(inflate_all(&packed, Algorithm::Zlib, 64).is_err());
    }
}
