//! Node: the listening side of the transport
//!
//! One task per connection reads frames; each request runs on its own task
//! and replies go back through a single writer task, so replies may leave
//! out of order and are matched by correlation id.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::envelope::Message;

use super::errors::TransportResult;
use super::frame::{read_frame, Frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};

/// Handles one decoded request envelope for a message type
pub trait Handler: Send + Sync + 'static {
    fn call(&self, msg: Message) -> BoxFuture<'_, Message>;
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identity announced in logs
    pub node_id: String,
    /// Service type label
    pub service_type: String,
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// Largest accepted frame
    pub max_frame_len: usize,
    /// Concurrent requests per connection
    pub max_in_flight: usize,
    /// How long `stop` waits for open connections to drain
    pub shutdown_grace: Duration,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            service_type: "_zap._tcp".to_string(),
            host: "0.0.0.0".to_string(),
            port,
            max_frame_len: MAX_FRAME_LEN,
            max_in_flight: 64,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type Handlers = Arc<HashMap<u16, Arc<dyn Handler>>>;

/// A transport node that has not started listening yet
pub struct Node {
    config: NodeConfig,
    handlers: HashMap<u16, Arc<dyn Handler>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a message type, replacing any previous one
    pub fn handle(&mut self, message_type: u16, handler: impl Handler) -> &mut Self {
        self.handlers.insert(message_type, Arc::new(handler));
        self
    }

    /// Bind and start accepting connections
    pub async fn start(self) -> TransportResult<NodeHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;

        info!(
            node_id = %self.config.node_id,
            service_type = %self.config.service_type,
            addr = %local_addr,
            message_types = ?self.handlers.keys().collect::<Vec<_>>(),
            "node listening"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = Arc::new(self.config);
        let handlers: Handlers = Arc::new(self.handlers);
        let accept_task = tokio::spawn(accept_loop(listener, config, handlers, shutdown_rx));

        Ok(NodeHandle {
            local_addr,
            shutdown_tx,
            accept_task,
        })
    }
}

/// A running node
pub struct NodeHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and reading, then wait for in-flight replies.
    ///
    /// Requests still running after the grace period are aborted; when this
    /// returns no request task is left running.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.accept_task.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<NodeConfig>,
    handlers: Handlers,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    let (abort_tx, abort_rx) = watch::channel(false);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        config.clone(),
                        handlers.clone(),
                        shutdown.clone(),
                        abort_rx.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    drop(listener);
    let drained = tokio::time::timeout(config.shutdown_grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            open = connections.len(),
            "connections still open after grace period, aborting"
        );
        // each connection aborts and joins its own request tasks
        let _ = abort_tx.send(true);
        while connections.join_next().await.is_some() {}
    }
    info!(node_id = %config.node_id, "node stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<NodeConfig>,
    handlers: Handlers,
    mut shutdown: watch::Receiver<bool>,
    mut abort: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Frame>(config.max_in_flight);
    let writer_task = tokio::spawn(write_loop(writer, rx, peer));
    let permits = Arc::new(Semaphore::new(config.max_in_flight));
    let mut requests = JoinSet::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = requests.join_next(), if !requests.is_empty() => continue,
            read = read_frame(&mut reader, &mut buf, config.max_frame_len) => match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(peer = %peer, "connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "closing connection");
                    break;
                }
            }
        };

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let handler = handlers.get(&frame.message_type).cloned();
        let tx = tx.clone();
        let max_frame_len = config.max_frame_len;
        requests.spawn(async move {
            let reply = respond(handler, frame, max_frame_len).await;
            let _ = tx.send(reply).await;
            drop(permit);
        });
    }

    drop(tx);
    let aborted = tokio::select! {
        _ = async { while requests.join_next().await.is_some() {} } => false,
        _ = abort.wait_for(|abort| *abort) => true,
    };
    if aborted {
        debug!(peer = %peer, in_flight = requests.len(), "aborting requests");
        requests.shutdown().await;
        writer_task.abort();
    }
    let _ = writer_task.await;
}

async fn respond(handler: Option<Arc<dyn Handler>>, frame: Frame, max_frame_len: usize) -> Frame {
    let reply = answer(handler, frame).await;
    // the peer checks the length prefix, which excludes its own four bytes
    if FRAME_HEADER_LEN - 4 + reply.payload.len() > max_frame_len {
        warn!(
            message_type = reply.message_type,
            correlation_id = reply.correlation_id,
            len = reply.payload.len(),
            "reply exceeds frame limit"
        );
        return Frame::error(
            reply.message_type,
            reply.correlation_id,
            format!(
                "reply of {} bytes exceeds maximum frame length of {}",
                reply.payload.len(),
                max_frame_len
            ),
        );
    }
    reply
}

async fn answer(handler: Option<Arc<dyn Handler>>, frame: Frame) -> Frame {
    let Frame {
        message_type,
        correlation_id,
        ..
    } = frame;

    if frame.is_error() {
        return Frame::error(message_type, correlation_id, "unexpected error frame");
    }
    let Some(handler) = handler else {
        return Frame::error(
            message_type,
            correlation_id,
            format!("no handler for message type {}", message_type),
        );
    };
    let msg = match Message::parse(frame.payload) {
        Ok(msg) => msg,
        Err(e) => {
            return Frame::error(
                message_type,
                correlation_id,
                format!("malformed envelope: {}", e),
            )
        }
    };

    match AssertUnwindSafe(handler.call(msg)).catch_unwind().await {
        Ok(reply) => Frame::new(message_type, correlation_id, reply.into_bytes()),
        Err(_) => {
            warn!(message_type, correlation_id, "handler panicked");
            Frame::error(message_type, correlation_id, "handler panicked")
        }
    }
}

async fn write_loop(writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>, peer: SocketAddr) {
    let mut writer = BufWriter::new(writer);
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame.encode()).await {
            warn!(peer = %peer, error = %e, "write failed");
            return;
        }
        if rx.is_empty() {
            if let Err(e) = writer.flush().await {
                warn!(peer = %peer, error = %e, "flush failed");
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}
