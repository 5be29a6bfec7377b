//! Key-value adapter
//!
//! `/get`, `/set`, `/mget`, `/cmd`, `/info` and `/health` over any [`KvClient`].
//! A missing key is a successful reply with a null value.

mod valkey;

pub use valkey::{RedisClient, RedisConnector};

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapters::BackendResult;
use crate::dispatch::{Adapter, BridgeError, OperationResult, Reply, RequestContext, RouteTable};
use crate::kind::BackendKind;

/// Key-value backend capability
pub trait KvClient: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>>;

    /// Store `value`; `ttl` of `None` means no expiry
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, BackendResult<()>>;

    fn mget<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, BackendResult<Vec<Option<String>>>>;

    /// Arbitrary command; the reply is rendered as JSON
    fn command<'a>(&'a self, name: &'a str, args: &'a [String]) -> BoxFuture<'a, BackendResult<Value>>;

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Deserialize)]
struct GetRequest {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SetRequest {
    key: String,
    value: Value,
    #[serde(default)]
    ttl: u64,
}

#[derive(Debug, Deserialize)]
struct MgetRequest {
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CmdRequest {
    cmd: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl CmdRequest {
    /// JSON `{cmd, args}`, else a whitespace-separated command line
    fn decode(body: &[u8]) -> Result<(String, Vec<String>), BridgeError> {
        let (cmd, args) = match serde_json::from_slice::<CmdRequest>(body) {
            Ok(req) => (req.cmd, req.args.iter().map(stringify).collect()),
            Err(_) => {
                let line = String::from_utf8_lossy(body);
                let mut parts = line.split_whitespace().map(str::to_string);
                let cmd = parts.next().unwrap_or_default();
                (cmd, parts.collect())
            }
        };
        if cmd.trim().is_empty() {
            return Err(BridgeError::invalid_request("empty command"));
        }
        Ok((cmd, args))
    }
}

/// Strings pass through; everything else is stored as its JSON text
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key-value bridge adapter
pub struct KvAdapter<C> {
    client: C,
}

impl<C: KvClient> KvAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn get(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            // a JSON object must name the key; anything else is the key itself
            let key = match serde_json::from_slice::<Value>(&body) {
                Ok(fields @ Value::Object(_)) => serde_json::from_value::<GetRequest>(fields)?.key,
                _ => String::from_utf8_lossy(&body).into_owned(),
            };
            let value = self.client.get(&key).await.map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({ "value": value })))
        })
    }

    fn set(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: SetRequest = serde_json::from_slice(&body)?;
            let ttl = (req.ttl > 0).then(|| Duration::from_secs(req.ttl));
            self.client
                .set(&req.key, &stringify(&req.value), ttl)
                .await
                .map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({ "status": "OK" })))
        })
    }

    fn mget(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: MgetRequest = serde_json::from_slice(&body)?;
            if req.keys.is_empty() {
                return Ok(Reply::ok(&json!({ "values": [] })));
            }
            let values = self.client.mget(&req.keys).await.map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({ "values": values })))
        })
    }

    fn cmd(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let (cmd, args) = CmdRequest::decode(&body)?;
            let result = self
                .client
                .command(&cmd, &args)
                .await
                .map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({ "result": result })))
        })
    }

    /// Server `INFO` text
    fn info(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let info = self
                .client
                .command("INFO", &[])
                .await
                .map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({ "info": info })))
        })
    }

    fn health(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            self.client.ping().await.map_err(BridgeError::unavailable)?;
            Ok(Reply::ok(&json!({
                "status": "ok",
                "service": BackendKind::Kv.service_name(),
            })))
        })
    }
}

impl<C: KvClient> Adapter for KvAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Kv
    }

    fn routes(&self) -> RouteTable<Self> {
        RouteTable::new()
            .route("/get", Self::get)
            .route("/set", Self::set)
            .route("/mget", Self::mget)
            .route("/cmd", Self::cmd)
            .route("/info", Self::info)
            .route_with_timeout("/health", Self::health, Duration::from_secs(5))
            .fallback("/cmd")
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.client.close()
    }
}
