//! Transport errors

use std::io;

use thiserror::Error;

use crate::envelope::EnvelopeError;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame header announces more than the configured maximum
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Frame header is inconsistent
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Peer closed the connection mid-frame
    #[error("connection closed mid-frame")]
    UnexpectedEof,

    /// Peer closed the connection before replying
    #[error("connection closed")]
    Closed,

    /// Peer answered with an error frame
    #[error("remote error: {0}")]
    Remote(String),

    /// Reply payload is not a valid envelope
    #[error("invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),
}
