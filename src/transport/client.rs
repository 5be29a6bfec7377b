//! Client: one persistent connection, one request at a time

use bytes::BytesMut;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::envelope::Message;

use super::errors::{TransportError, TransportResult};
use super::frame::{read_frame, write_frame, Frame, MAX_FRAME_LEN};

/// Sequential request/response client
pub struct Client {
    stream: TcpStream,
    buf: BytesMut,
    next_id: u32,
    max_frame_len: usize,
}

impl Client {
    /// Open a connection
    pub async fn connect(addr: impl ToSocketAddrs) -> TransportResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(8 * 1024),
            next_id: 1,
            max_frame_len: MAX_FRAME_LEN,
        })
    }

    /// Send one envelope and wait for its reply
    pub async fn call(&mut self, message_type: u16, msg: &Message) -> TransportResult<Message> {
        let correlation_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let request = Frame::new(message_type, correlation_id, msg.as_bytes().clone());
        write_frame(&mut self.stream, &request).await?;

        loop {
            let frame = read_frame(&mut self.stream, &mut self.buf, self.max_frame_len)
                .await?
                .ok_or(TransportError::Closed)?;
            if frame.correlation_id != correlation_id {
                continue;
            }
            if frame.is_error() {
                return Err(TransportError::Remote(frame.error_message()));
            }
            return Ok(Message::parse(frame.payload)?);
        }
    }
}
