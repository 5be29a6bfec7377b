//! Transport
//!
//! Persistent TCP connections carrying length-prefixed frames. Each frame
//! names a message type; the node hands the envelope to the handler
//! registered for that type and writes the reply frame back with the same
//! correlation id.

mod client;
mod errors;
mod frame;
mod node;

pub use client::Client;
pub use errors::{TransportError, TransportResult};
pub use frame::{read_frame, write_frame, Frame, FLAG_ERROR, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use node::{Handler, Node, NodeConfig, NodeHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{encode_request, layout, Message};
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replies with the request path copied into the body
    struct PathEcho;

    impl Handler for PathEcho {
        fn call(&self, msg: Message) -> BoxFuture<'_, Message> {
            Box::pin(async move {
                let path = msg.root().text(layout::REQUEST_PATH).unwrap_or("").to_string();
                encode_request(&path, b"echoed")
            })
        }
    }

    async fn start_node() -> NodeHandle {
        let mut node = Node::new(NodeConfig {
            host: "127.0.0.1".to_string(),
            ..NodeConfig::new("test", 0)
        });
        node.handle(301, PathEcho);
        node.start().await.unwrap()
    }

    #[tokio::test]
    async fn test_request_reply_over_tcp() {
        let handle = start_node().await;
        let mut client = Client::connect(handle.local_addr()).await.unwrap();

        for path in ["/get", "/set"] {
            let reply = client.call(301, &encode_request(path, b"")).await.unwrap();
            assert_eq!(reply.root().text(layout::REQUEST_PATH).unwrap(), path);
        }

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_message_type_gets_error_frame() {
        let handle = start_node().await;
        let mut client = Client::connect(handle.local_addr()).await.unwrap();

        let err = client.call(999, &encode_request("/get", b"")).await.unwrap_err();
        match err {
            TransportError::Remote(message) => assert!(message.contains("999")),
            other => panic!("unexpected error: {other}"),
        }

        // connection stays usable
        let reply = client.call(301, &encode_request("/get", b"")).await.unwrap();
        assert_eq!(reply.root().text(layout::REQUEST_PATH).unwrap(), "/get");
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_envelope_gets_error_frame() {
        use bytes::Bytes;
        use tokio::net::TcpStream;

        let handle = start_node().await;
        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        let frame = Frame::new(301, 42, Bytes::from_static(b"not an envelope"));
        write_frame(&mut stream, &frame).await.unwrap();

        let mut buf = bytes::BytesMut::new();
        let reply = read_frame(&mut stream, &mut buf, MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.correlation_id, 42);
        assert!(reply.is_error());
        assert!(reply.error_message().starts_with("malformed envelope"));
        handle.stop().await;
    }

    /// Replies with a body far larger than the node's frame limit
    struct Oversized;

    impl Handler for Oversized {
        fn call(&self, _msg: Message) -> BoxFuture<'_, Message> {
            Box::pin(async move { encode_request("/big", &[7u8; 4096]) })
        }
    }

    #[tokio::test]
    async fn test_oversized_reply_becomes_error_frame() {
        let mut node = Node::new(NodeConfig {
            host: "127.0.0.1".to_string(),
            max_frame_len: 1024,
            ..NodeConfig::new("test", 0)
        });
        node.handle(302, Oversized);
        let handle = node.start().await.unwrap();
        let mut client = Client::connect(handle.local_addr()).await.unwrap();

        let err = client.call(302, &encode_request("/big", b"")).await.unwrap_err();
        match err {
            TransportError::Remote(message) => {
                assert!(message.contains("exceeds maximum frame length of 1024"))
            }
            other => panic!("unexpected error: {other}"),
        }
        handle.stop().await;
    }

    /// Sets its flag when dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Never finishes on its own
    struct Stuck {
        started: Arc<Notify>,
        dropped: Arc<AtomicBool>,
    }

    impl Handler for Stuck {
        fn call(&self, _msg: Message) -> BoxFuture<'_, Message> {
            Box::pin(async move {
                let _flag = DropFlag(self.dropped.clone());
                self.started.notify_one();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                encode_request("/late", b"")
            })
        }
    }

    #[tokio::test]
    async fn test_stop_joins_aborted_requests() {
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let mut node = Node::new(NodeConfig {
            host: "127.0.0.1".to_string(),
            shutdown_grace: Duration::from_millis(50),
            ..NodeConfig::new("test", 0)
        });
        node.handle(
            303,
            Stuck {
                started: started.clone(),
                dropped: dropped.clone(),
            },
        );
        let handle = node.start().await.unwrap();

        let mut client = Client::connect(handle.local_addr()).await.unwrap();
        let pending =
            tokio::spawn(async move { client.call(303, &encode_request("/slow", b"")).await });
        started.notified().await;
        assert!(!dropped.load(Ordering::SeqCst));

        handle.stop().await;
        assert!(dropped.load(Ordering::SeqCst));
        assert!(pending.await.unwrap().is_err());
    }
}
