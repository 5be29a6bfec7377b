//! Length-prefixed frames
//!
//! ```text
//! u32 length | u16 message type | u16 flags | u32 correlation id | payload
//! ```
//!
//! Little-endian. `length` counts every byte after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::{TransportError, TransportResult};

/// Bytes before the payload, including the length prefix
pub const FRAME_HEADER_LEN: usize = 12;

/// Header bytes counted by the length prefix
const COUNTED_HEADER_LEN: usize = FRAME_HEADER_LEN - 4;

/// Default maximum frame length (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Payload is a UTF-8 transport error message, not an envelope
pub const FLAG_ERROR: u16 = 0x0001;

/// One transport unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u16,
    pub flags: u16,
    pub correlation_id: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Frame carrying an envelope
    pub fn new(message_type: u16, correlation_id: u32, payload: Bytes) -> Self {
        Self {
            message_type,
            flags: 0,
            correlation_id,
            payload,
        }
    }

    /// Transport-level error reply
    pub fn error(message_type: u16, correlation_id: u32, message: impl Into<String>) -> Self {
        Self {
            message_type,
            flags: FLAG_ERROR,
            correlation_id,
            payload: Bytes::from(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.flags & FLAG_ERROR != 0
    }

    /// Error text of an error frame
    pub fn error_message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Serialize header and payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.put_u32_le((COUNTED_HEADER_LEN + self.payload.len()) as u32);
        buf.put_u16_le(self.message_type);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.correlation_id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Take one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode(buf: &mut BytesMut, max_len: usize) -> TransportResult<Option<Frame>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let len = (&buf[..4]).get_u32_le() as usize;
        if len < COUNTED_HEADER_LEN {
            return Err(TransportError::MalformedFrame(format!(
                "length {} shorter than header",
                len
            )));
        }
        if len > max_len {
            return Err(TransportError::FrameTooLarge { len, max: max_len });
        }
        if buf.len() < 4 + len {
            buf.reserve(4 + len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(4 + len);
        frame.advance(4);
        let message_type = frame.get_u16_le();
        let flags = frame.get_u16_le();
        let correlation_id = frame.get_u32_le();

        Ok(Some(Frame {
            message_type,
            flags,
            correlation_id,
            payload: frame.freeze(),
        }))
    }
}

/// Read the next frame; `Ok(None)` on a clean close between frames
pub async fn read_frame<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_len: usize,
) -> TransportResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = Frame::decode(buf, max_len)? {
            return Ok(Some(frame));
        }
        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(TransportError::UnexpectedEof);
        }
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let encoded = Frame::new(301, 7, Bytes::from_static(b"payload")).encode();
        let mut buf = BytesMut::from(&encoded[..5]);
        assert_eq!(Frame::decode(&mut buf, MAX_FRAME_LEN).unwrap(), None);

        buf.extend_from_slice(&encoded[5..]);
        let frame = Frame::decode(&mut buf, MAX_FRAME_LEN).unwrap().unwrap();
        assert_eq!(frame.message_type, 301);
        assert_eq!(frame.correlation_id, 7);
        assert_eq!(&frame.payload[..], b"payload");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::new(300, 1, Bytes::from_static(b"a")).encode());
        buf.extend_from_slice(&Frame::error(300, 2, "boom").encode());

        let first = Frame::decode(&mut buf, MAX_FRAME_LEN).unwrap().unwrap();
        let second = Frame::decode(&mut buf, MAX_FRAME_LEN).unwrap().unwrap();
        assert!(!first.is_error());
        assert!(second.is_error());
        assert_eq!(second.error_message(), "boom");
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let encoded = Frame::new(300, 1, Bytes::from(vec![0u8; 64])).encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let err = Frame::decode(&mut buf, 16).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_length_shorter_than_header_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(2);
        buf.put_u16_le(0);
        let err = Frame::decode(&mut buf, MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof_and_truncated_eof() {
        let mut empty: &[u8] = &[];
        let mut buf = BytesMut::new();
        assert!(read_frame(&mut empty, &mut buf, MAX_FRAME_LEN)
            .await
            .unwrap()
            .is_none());

        let encoded = Frame::new(300, 1, Bytes::from_static(b"abc")).encode();
        let mut truncated: &[u8] = &encoded[..encoded.len() - 1];
        let mut buf = BytesMut::new();
        let err = read_frame(&mut truncated, &mut buf, MAX_FRAME_LEN)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedEof));
    }
}
