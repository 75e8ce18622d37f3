use thiserror::Error;

/// Error type for minibitcask.
#[derive(Error, Debug)]
pub enum KvsError {
    /// Underlying I/O failure (open, read, write, rename, mkdir, ...).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The key has no live entry in the index.
    ///
    /// Never surfaces from [`crate::Store::get`], which swallows it for
    /// reference compatibility; it is visible through
    /// [`crate::Store::get_opt`] and [`crate::Store::delete`]'s internal
    /// no-op check.
    #[error("Key not found")]
    KeyNotFound,
    /// `close` called with no open log file, i.e. on an already-closed
    /// store.
    #[error("invalid log file")]
    InvalidLogFile,
    /// A record could not be encoded (sizes overflowing the 32-bit width).
    #[error("failed to encode record: {0}")]
    EncodeError(String),
    /// A record read back from the log violates the record format: an
    /// unrecognized mark, a torn record, or (with the `checksum` feature)
    /// a checksum mismatch.
    #[error("failed to decode record: {0}")]
    DecodeError(String),
}

/// Custom result type for [`KvsError`].
pub type Result<T> = std::result::Result<T, KvsError>;
