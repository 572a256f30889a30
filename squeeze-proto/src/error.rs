//! Error types for frame transfer.

use std::io;

/// Alias for `Result<T, squeeze_proto::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the frame codec and the transfer orchestrator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer closed the stream before an exact transfer completed.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A frame header carried a length or flag outside the allowed domain.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// An outbound body does not fit in a single frame.
    #[error("payload of {len} bytes exceeds frame limit of {max} bytes")]
    PayloadTooLarge {
        /// Frame length the body would need (flag byte included).
        len: u64,
        /// Largest frame length allowed.
        max: u64,
    },

    /// The plain layout has no way to frame an empty body.
    #[error("plain frames cannot carry an empty body")]
    EmptyFrame,

    /// The decompressor rejected a compressed frame body.
    #[error("corrupt compressed data: {0}")]
    CorruptCompressedData(String),

    /// The consumer of a received body failed. The rest of the frame was
    /// discarded, so the stream is still positioned on a frame boundary.
    #[error("delivery failed: {0}")]
    Delivery(io::Error),

    /// A [`Config`](crate::Config) value no transfer can work with.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Reading or staging the outbound source failed before any byte of
    /// its frame was written.
    #[error("source unavailable: {0}")]
    Source(io::Error),

    /// The transfer was aborted through its cancellation token.
    #[error("transfer cancelled")]
    Cancelled,

    /// An I/O error from the transport, a file, or the temporary spool.
    #[error(transparent)]
    Io(io::Error),
}

impl Error {
    /// Returns `false` when the stream is still on a frame boundary.
    ///
    /// After a fatal error the stream position is unknown and the
    /// connection must be dropped.
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PayloadTooLarge { .. }
                | Self::EmptyFrame
                | Self::Delivery(_)
                | Self::Source(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Builds an [`Error::InvalidFrame`] from anything printable.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::WriteZero => Self::ConnectionClosed,
            _ => Self::Io(e),
        }
    }
}
