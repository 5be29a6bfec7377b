//! Envelope decoding errors

use thiserror::Error;

/// Result type for envelope operations
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Envelope decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Buffer shorter than the fixed header
    #[error("envelope truncated: {len} bytes")]
    Truncated { len: usize },

    /// Magic prefix mismatch
    #[error("bad envelope magic")]
    BadMagic,

    /// Root object lies outside the buffer
    #[error("root object out of bounds at offset {offset}")]
    RootOutOfBounds { offset: usize },

    /// Field slot lies outside the object's data section
    #[error("field offset {offset} (width {width}) outside object of size {size}")]
    FieldOutOfBounds {
        offset: usize,
        width: usize,
        size: usize,
    },

    /// Blob referenced by a field lies outside the buffer
    #[error("blob at offset {offset} out of bounds")]
    BlobOutOfBounds { offset: usize },

    /// Text field is not valid UTF-8
    #[error("text field at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
}
