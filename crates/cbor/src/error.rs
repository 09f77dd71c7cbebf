//! Codec errors.

/// Result alias used throughout the codec.
pub type Result<T> = std::result::Result<T, CborError>;

/// Errors raised while encoding to a sink or decoding from a source.
#[derive(thiserror::Error, Debug)]
pub enum CborError {
    /// The byte pattern is not well-formed CBOR (or uses a construct this
    /// decoder rejects, such as reserved additional-info values).
    #[error("malformed CBOR: {0}")]
    MalformedInput(String),

    /// The source ran out of bytes in the middle of an item.
    #[error("unexpected end of CBOR input")]
    UnexpectedEnd,

    /// The underlying reader or writer failed.
    #[error("CBOR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CborError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }
}
