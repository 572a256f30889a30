//! Length-prefixed framing with per-frame adaptive compression.
//!
//! Every frame on the wire is
//!
//! ```text
//! [length: u32 LE][flag: u8][body]
//! ```
//!
//! where `length` counts the flag byte plus the body. The sender compresses
//! each body on trial and transmits whichever representation is strictly
//! smaller, so a frame never costs more than one byte over the raw payload.
//! Bodies stream through bounded buffers in both directions; large sources
//! spool their compressed trial to a temporary file instead of memory.
//!
//! [`Layout::Plain`] drops the flag byte for peers that only exchange raw
//! bodies.

mod bounded;
mod cancel;
mod codec;
mod config;
mod error;
mod frame;
mod select;
mod transfer;

pub use bounded::BoundedReader;
pub use cancel::Cancel;
pub use codec::{Algorithm, Compressor, DEFAULT_LEVEL, Decompressor, Step, compress_to_vec};
pub use config::{
    Config, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_DECODED_BYTES, DEFAULT_SPOOL_THRESHOLD, MAX_CHUNK_SIZE,
};
pub use error::{Error, Result};
pub use frame::{
    DEFAULT_MAX_FRAME_BYTES, Flag, FrameHeader, LENGTH_FIELD, Layout, MAX_HEADER_LEN,
    decode_length, read_frame_header, try_read_frame_header, write_frame, write_frame_header,
};
pub use select::{Body, Choice, Source, choose, decide, passthrough};
pub use transfer::{Received, Sent, Transfer};
