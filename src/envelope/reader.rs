//! Zero-copy envelope reads

use std::ops::Range;

use bytes::{Buf, Bytes};

use super::errors::{EnvelopeError, EnvelopeResult};
use super::{HEADER_LEN, MAGIC};

/// A parsed envelope
///
/// Holds the received buffer; field reads borrow from it.
#[derive(Debug, Clone)]
pub struct Message {
    buf: Bytes,
    /// Start of the root object's data section
    data: usize,
    /// Size of the root object's data section
    size: usize,
}

impl Message {
    /// Validate the header and root object bounds
    pub fn parse(buf: Bytes) -> EnvelopeResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(EnvelopeError::Truncated { len: buf.len() });
        }
        if buf[..4] != MAGIC {
            return Err(EnvelopeError::BadMagic);
        }

        let root = read_u32(&buf, 4) as usize;
        if root < HEADER_LEN || root + 4 > buf.len() {
            return Err(EnvelopeError::RootOutOfBounds { offset: root });
        }

        let size = read_u32(&buf, root) as usize;
        let data = root + 4;
        if data + size > buf.len() {
            return Err(EnvelopeError::RootOutOfBounds { offset: root });
        }

        Ok(Self { buf, data, size })
    }

    /// The encoded buffer
    pub fn as_bytes(&self) -> &Bytes {
        &self.buf
    }

    /// Consume into the encoded buffer
    pub fn into_bytes(self) -> Bytes {
        self.buf
    }

    /// Reader over the root object
    pub fn root(&self) -> ObjectReader<'_> {
        ObjectReader { msg: self }
    }
}

/// Random-access field reads on the root object
#[derive(Clone, Copy)]
pub struct ObjectReader<'a> {
    msg: &'a Message,
}

impl<'a> ObjectReader<'a> {
    /// Read a u32 scalar
    pub fn uint32(&self, offset: usize) -> EnvelopeResult<u32> {
        let at = self.slot(offset)?;
        Ok(read_u32(&self.msg.buf, at))
    }

    /// Read a bytes field; absent fields read as empty
    pub fn bytes(&self, offset: usize) -> EnvelopeResult<&'a [u8]> {
        let range = self.blob(offset)?;
        Ok(&self.msg.buf[range])
    }

    /// Read a bytes field as a shared slice of the underlying buffer
    pub fn bytes_shared(&self, offset: usize) -> EnvelopeResult<Bytes> {
        let range = self.blob(offset)?;
        Ok(self.msg.buf.slice(range))
    }

    /// Read a UTF-8 text field; absent fields read as ""
    pub fn text(&self, offset: usize) -> EnvelopeResult<&'a str> {
        let raw = self.bytes(offset)?;
        std::str::from_utf8(raw).map_err(|_| EnvelopeError::InvalidUtf8 { offset })
    }

    fn slot(&self, offset: usize) -> EnvelopeResult<usize> {
        if offset + 4 > self.msg.size {
            return Err(EnvelopeError::FieldOutOfBounds {
                offset,
                width: 4,
                size: self.msg.size,
            });
        }
        Ok(self.msg.data + offset)
    }

    fn blob(&self, offset: usize) -> EnvelopeResult<Range<usize>> {
        let at = self.slot(offset)?;
        let blob = read_u32(&self.msg.buf, at) as usize;
        if blob == 0 {
            return Ok(0..0);
        }

        let buf = &self.msg.buf;
        if blob + 4 > buf.len() {
            return Err(EnvelopeError::BlobOutOfBounds { offset: blob });
        }
        let len = read_u32(buf, blob) as usize;
        let start = blob + 4;
        if start + len > buf.len() {
            return Err(EnvelopeError::BlobOutOfBounds { offset: blob });
        }
        Ok(start..start + len)
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    (&buf[at..at + 4]).get_u32_le()
}
