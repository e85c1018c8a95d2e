use thiserror::Error;

/// The closed set of failure modes the engine can produce. Every fallible
/// operation in this crate returns [`Result`], never a raw `std::io::Error`
/// or a boxed `dyn Error` — callers match on this enum directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer out of bound: requested offset {requested_offset}, length {requested_length}, current size {current_size}")]
    BufferOutOfBound {
        requested_offset: usize,
        requested_length: usize,
        current_size: usize,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("type not registered: {0}")]
    TypeNotRegistered(String),

    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("reference error: {0}")]
    RefError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("stream I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("size arithmetic overflowed 32-bit bounds: {0}")]
    OutOfBound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[inline]
    pub(crate) fn bounds(requested_offset: usize, requested_length: usize, current_size: usize) -> Self {
        Error::BufferOutOfBound { requested_offset, requested_length, current_size }
    }

    #[inline]
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidData(msg.into())
    }
}
