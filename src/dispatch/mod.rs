//! Dispatcher
//!
//! The single handler registered for a bridge's message type. It reads the
//! path and body out of the request envelope, resolves the adapter
//! operation, runs it under a deadline and always answers with exactly one
//! response envelope.

mod context;
mod errors;
mod response;
mod route;

pub use context::RequestContext;
pub use errors::{BridgeError, BridgeResult};
pub use response::{ContentType, Reply};
pub use route::{Operation, OperationResult, Route, RouteTable};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tracing::{debug, info_span, warn, Instrument};

use crate::envelope::{layout, Message};
use crate::kind::BackendKind;
use crate::tools::{self, RESOURCE_SCHEME, TOOLS_ROUTE};
use crate::transport::Handler;

/// Default time budget for an operation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A backend adapter: owns the connection handle and declares its routes
pub trait Adapter: Send + Sync + Sized + 'static {
    fn kind(&self) -> BackendKind;

    /// Route table, built once by the dispatcher
    fn routes(&self) -> RouteTable<Self>;

    /// Release the connection handle
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Object-safe view of a dispatcher
pub trait Bridge: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Handle one request; never fails, errors become error replies
    fn handle<'a>(&'a self, path: &'a str, body: Bytes) -> BoxFuture<'a, Reply>;

    /// Registered routes, sorted
    fn routes(&self) -> Vec<&'static str>;

    /// Release the backend connection
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Routes requests to one adapter
pub struct Dispatcher<A: Adapter> {
    adapter: A,
    routes: RouteTable<A>,
    default_timeout: Duration,
}

impl<A: Adapter> Dispatcher<A> {
    pub fn new(adapter: A) -> Self {
        let routes = adapter.routes();
        Self {
            adapter,
            routes,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Budget for routes without their own timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    async fn run(&self, path: &str, body: Bytes) -> Reply {
        if path == TOOLS_ROUTE {
            let catalogue = tools::catalogue(self.adapter.kind(), &self.routes.paths());
            return Reply::ok(&catalogue);
        }
        let path = if path.starts_with(RESOURCE_SCHEME) {
            tools::resource_route(self.adapter.kind(), path).unwrap_or(path)
        } else {
            path
        };

        let Some((route_name, route)) = self.routes.resolve(path, !body.is_empty()) else {
            debug!(path, "unknown path");
            return BridgeError::UnknownPath(path.to_string()).into();
        };

        let timeout = route.timeout().unwrap_or(self.default_timeout);
        let ctx = RequestContext::new(route_name, timeout);
        let span = info_span!(
            "request",
            request_id = %ctx.request_id(),
            route = route_name,
            backend = self.adapter.kind().as_str(),
        );
        let op = route.operation();

        async move {
            let result = match tokio::time::timeout(timeout, op(&self.adapter, ctx.clone(), body)).await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::Timeout(timeout)),
            };

            match result {
                Ok(reply) => {
                    debug!(
                        status = reply.status(),
                        elapsed_ms = ctx.elapsed_ms() as u64,
                        "request completed"
                    );
                    reply
                }
                Err(err) => {
                    warn!(
                        status = err.status_code(),
                        code = err.code(),
                        error = %err,
                        elapsed_ms = ctx.elapsed_ms() as u64,
                        "request failed"
                    );
                    err.into()
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl<A: Adapter> Bridge for Dispatcher<A> {
    fn kind(&self) -> BackendKind {
        self.adapter.kind()
    }

    fn handle<'a>(&'a self, path: &'a str, body: Bytes) -> BoxFuture<'a, Reply> {
        Box::pin(self.run(path, body))
    }

    fn routes(&self) -> Vec<&'static str> {
        self.routes.paths()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.adapter.close()
    }
}

/// Decode a request envelope, dispatch it and encode the reply
pub async fn dispatch_envelope(bridge: &dyn Bridge, msg: Message) -> Message {
    let root = msg.root();
    let fields = root
        .text(layout::REQUEST_PATH)
        .and_then(|path| Ok((path, root.bytes_shared(layout::REQUEST_BODY)?)));

    let reply = match fields {
        Ok((path, body)) => bridge.handle(path, body).await,
        Err(e) => {
            warn!(error = %e, "unreadable request envelope");
            BridgeError::invalid_request(format!("invalid envelope: {}", e)).into()
        }
    };
    reply.to_message()
}

/// Transport handler wrapping a bridge
#[derive(Clone)]
pub struct BridgeHandler {
    bridge: Arc<dyn Bridge>,
}

impl BridgeHandler {
    pub fn new(bridge: Arc<dyn Bridge>) -> Self {
        Self { bridge }
    }
}

impl Handler for BridgeHandler {
    fn call(&self, msg: Message) -> BoxFuture<'_, Message> {
        Box::pin(dispatch_envelope(self.bridge.as_ref(), msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{encode_request, Builder};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Fake {
        closed: AtomicBool,
    }

    fn echo(_: &Fake, ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            Ok(Reply::ok(&json!({
                "route": ctx.route(),
                "body": String::from_utf8_lossy(&body),
            })))
        })
    }

    fn fail(_: &Fake, _: RequestContext, _: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async { Err(BridgeError::backend("connection reset")) })
    }

    fn slow(_: &Fake, _: RequestContext, _: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::ok(&json!({})))
        })
    }

    impl Adapter for Fake {
        fn kind(&self) -> BackendKind {
            BackendKind::Sql
        }

        fn routes(&self) -> RouteTable<Self> {
            RouteTable::new()
                .route("/query", echo)
                .route("/fail", fail)
                .route("/schema", echo)
                .route_with_timeout("/slow", slow, Duration::from_millis(20))
                .fallback("/query")
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            Box::pin(async { self.closed.store(true, Ordering::SeqCst) })
        }
    }

    fn dispatcher() -> Dispatcher<Fake> {
        Dispatcher::new(Fake::default())
    }

    #[tokio::test]
    async fn test_exact_route() {
        let reply = dispatcher().handle("/query", Bytes::from_static(b"SELECT 1")).await;
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.body_json().unwrap()["route"], "/query");
    }

    #[tokio::test]
    async fn test_empty_path_with_body_uses_default_operation() {
        let reply = dispatcher().handle("", Bytes::from_static(b"SELECT 1")).await;
        assert_eq!(reply.status(), 200);
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"route": "/query", "body": "SELECT 1"})
        );
    }

    #[tokio::test]
    async fn test_unknown_path_without_body_is_404() {
        let reply = dispatcher().handle("/nope", Bytes::new()).await;
        assert_eq!(reply.status(), 404);
        assert_eq!(reply.body_json().unwrap(), json!({"error": "unknown path: /nope"}));
    }

    #[tokio::test]
    async fn test_operation_error_becomes_error_reply() {
        let reply = dispatcher().handle("/fail", Bytes::new()).await;
        assert_eq!(reply.status(), 500);
        assert_eq!(reply.body_json().unwrap(), json!({"error": "connection reset"}));
    }

    #[tokio::test]
    async fn test_route_timeout_is_504() {
        let reply = dispatcher().handle("/slow", Bytes::new()).await;
        assert_eq!(reply.status(), 504);
    }

    #[tokio::test]
    async fn test_tools_lists_registered_routes_only() {
        let reply = dispatcher().handle(TOOLS_ROUTE, Bytes::new()).await;
        let value = reply.body_json().unwrap();
        let names: Vec<_> = value["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["sql_query"]);
    }

    #[tokio::test]
    async fn test_resource_uri_reads_its_route() {
        let d = dispatcher();
        let reply = d.handle("zap://sql/schema", Bytes::new()).await;
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.body_json().unwrap()["route"], "/schema");

        let reply = d.handle("zap://kv/info", Bytes::new()).await;
        assert_eq!(reply.status(), 404);

        let catalogue = d.handle(TOOLS_ROUTE, Bytes::new()).await.body_json().unwrap();
        assert_eq!(catalogue["resources"][0]["uri"], "zap://sql/schema");
    }

    #[tokio::test]
    async fn test_dispatch_envelope_roundtrip() {
        let d = dispatcher();
        let out = dispatch_envelope(&d, encode_request("/query", b"SELECT 2")).await;
        let reply = Reply::from_message(&out).unwrap();
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.body_json().unwrap()["body"], "SELECT 2");
    }

    #[tokio::test]
    async fn test_unreadable_envelope_is_400() {
        // root object too small to hold the request fields
        let mut builder = Builder::new(32);
        builder.start_object(4).finish_as_root();
        let out = dispatch_envelope(&dispatcher(), builder.finish()).await;
        assert_eq!(Reply::from_message(&out).unwrap().status(), 400);
    }

    #[tokio::test]
    async fn test_close_reaches_adapter() {
        let d = dispatcher();
        Bridge::close(&d).await;
        assert!(d.adapter().closed.load(Ordering::SeqCst));
    }
}
