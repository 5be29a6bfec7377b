//! Envelope construction

use bytes::{BufMut, BytesMut};

use super::reader::Message;
use super::{HEADER_LEN, MAGIC};

/// Growable envelope buffer
///
/// Objects reserve their data section up front; blobs are appended after it
/// and patched into the owning field slot.
pub struct Builder {
    buf: BytesMut,
}

impl Builder {
    /// Allocate a builder with `capacity` bytes preallocated
    pub fn new(capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity.max(HEADER_LEN));
        buf.put_slice(&MAGIC);
        buf.put_u32_le(0);
        Self { buf }
    }

    /// Start an object whose data section holds `size` bytes of field slots
    pub fn start_object(&mut self, size: usize) -> ObjectBuilder<'_> {
        let start = self.buf.len();
        self.buf.put_u32_le(len_u32(size));
        self.buf.put_bytes(0, size);
        ObjectBuilder {
            builder: self,
            start,
            size,
        }
    }

    /// Freeze the buffer into a readable message
    ///
    /// # Panics
    ///
    /// Panics if no object was finished as root.
    pub fn finish(self) -> Message {
        Message::parse(self.buf.freeze()).expect("builder must finish a root object")
    }

    fn write_u32_at(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Field writer for one object
pub struct ObjectBuilder<'a> {
    builder: &'a mut Builder,
    start: usize,
    size: usize,
}

impl ObjectBuilder<'_> {
    /// Set a u32 scalar at `offset`
    ///
    /// # Panics
    ///
    /// Panics if the slot does not fit the object's data section.
    pub fn set_u32(&mut self, offset: usize, value: u32) {
        let at = self.slot(offset);
        self.builder.write_u32_at(at, value);
    }

    /// Set a bytes field at `offset`
    ///
    /// # Panics
    ///
    /// Panics if the slot does not fit the object's data section.
    pub fn set_bytes(&mut self, offset: usize, value: &[u8]) {
        let at = self.slot(offset);
        let blob = self.builder.buf.len();
        self.builder.buf.put_u32_le(len_u32(value.len()));
        self.builder.buf.put_slice(value);
        self.builder.write_u32_at(at, len_u32(blob));
    }

    /// Set a text field at `offset`
    pub fn set_text(&mut self, offset: usize, value: &str) {
        self.set_bytes(offset, value.as_bytes());
    }

    /// Mark this object as the message root
    pub fn finish_as_root(self) {
        let root = len_u32(self.start);
        self.builder.write_u32_at(4, root);
    }

    fn slot(&self, offset: usize) -> usize {
        assert!(
            offset + 4 <= self.size,
            "field offset {} outside object of size {}",
            offset,
            self.size
        );
        self.start + 4 + offset
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).expect("envelope exceeds 4 GiB")
}
