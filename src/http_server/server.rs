//! # Health server
//!
//! Axum router exposing the bridge's `/health` and `/tools` routes over
//! plain HTTP.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::HealthServerConfig;
use crate::dispatch::{Bridge, Reply};
use crate::tools::TOOLS_ROUTE;

type SharedBridge = Arc<dyn Bridge>;

/// HTTP server for health probes
pub struct HealthServer {
    config: HealthServerConfig,
    router: Router,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, bridge: SharedBridge) -> Self {
        Self {
            config,
            router: build_router(bridge),
        }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve in the background until the handle is stopped
    pub async fn start(self) -> io::Result<HealthServerHandle> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, self.router)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        info!(addr = %local_addr, "health endpoint listening");
        Ok(HealthServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Running health server
pub struct HealthServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl HealthServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for in-flight requests
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "health endpoint stopped with error"),
            Err(e) => warn!(error = %e, "health endpoint task failed"),
        }
    }
}

fn build_router(bridge: SharedBridge) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(TOOLS_ROUTE, get(tools_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

async fn health_handler(State(bridge): State<SharedBridge>) -> Response {
    into_response(bridge.handle("/health", Bytes::new()).await)
}

async fn tools_handler(State(bridge): State<SharedBridge>) -> Response {
    into_response(bridge.handle(TOOLS_ROUTE, Bytes::new()).await)
}

fn into_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, reply.content_type().mime())],
        Body::from(reply.body().clone()),
    )
        .into_response()
}
