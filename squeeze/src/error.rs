//! Error types for the squeeze runtime.

/// Alias for `Result<T, squeeze::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by queues, connection halves and endpoints.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A frame-level failure.
    #[error(transparent)]
    Proto(#[from] squeeze_proto::Error),

    /// An earlier fatal error left this connection half unusable.
    #[error("connection half poisoned by an earlier fatal error")]
    Poisoned,

    /// The consumer of the outbound queue has stopped.
    #[error("outbound queue closed")]
    QueueClosed,

    /// A bounded queue needs room for at least one item.
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    /// An I/O error from a socket, a directory, or a background task.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `false` when the failed operation left its stream usable.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Proto(e) => e.is_fatal(),
            Self::InvalidCapacity => false,
            Self::Poisoned | Self::QueueClosed | Self::Io(_) => true,
        }
    }
}
