//! # ZAP Envelope Codec
//!
//! Fixed-field binary envelope wrapping every request and response.
//!
//! ## Layout
//!
//! ```text
//! magic "ZAP\x01" | u32 root offset | object | blobs...
//! object = u32 data size | data (fields at numeric offsets)
//! blob   = u32 length | bytes
//! ```
//!
//! All integers are little-endian. Scalar fields are stored inline in the
//! object's data section. Bytes and text fields store the absolute offset of
//! a blob; offset 0 means the field is absent and reads as empty.
//!
//! Reads never copy: `bytes`/`text` borrow from the received buffer and
//! `bytes_shared` hands out a reference-counted slice of it.

mod builder;
mod errors;
mod reader;

pub use builder::{Builder, ObjectBuilder};
pub use errors::{EnvelopeError, EnvelopeResult};
pub use reader::{Message, ObjectReader};

/// Magic prefix of every envelope buffer
pub const MAGIC: [u8; 4] = *b"ZAP\x01";

/// Size of the buffer header (magic + root offset)
pub const HEADER_LEN: usize = 8;

/// Field offsets shared by every adapter
pub mod layout {
    /// Request routing path (text)
    pub const REQUEST_PATH: usize = 4;
    /// Request body (bytes)
    pub const REQUEST_BODY: usize = 12;
    /// Data section size of a request object
    pub const REQUEST_SIZE: usize = 16;

    /// Response status code (u32)
    pub const RESPONSE_STATUS: usize = 0;
    /// Response body (bytes, JSON or NDJSON)
    pub const RESPONSE_BODY: usize = 4;
    /// Response headers (bytes, JSON map)
    pub const RESPONSE_HEADERS: usize = 8;
    /// Data section size of a response object
    pub const RESPONSE_SIZE: usize = 12;
}

/// Encode a request envelope carrying `path` and `body`.
pub fn encode_request(path: &str, body: &[u8]) -> Message {
    let mut builder = Builder::new(64 + path.len() + body.len());
    let mut object = builder.start_object(layout::REQUEST_SIZE);
    object.set_text(layout::REQUEST_PATH, path);
    object.set_bytes(layout::REQUEST_BODY, body);
    object.finish_as_root();
    builder.finish()
}
