//! Valkey/Redis client over a multiplexed connection manager

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use redis::aio::ConnectionManager;
use redis::{ConnectionInfo, IntoConnectionInfo, Value as RedisValue};
use serde_json::{Map, Value};
use tracing::info;

use super::KvClient;
use crate::adapters::{BackendError, BackendResult};
use crate::bootstrap::Connector;

/// Opens the connection manager during bootstrap
pub struct RedisConnector {
    info: ConnectionInfo,
    label: String,
}

impl RedisConnector {
    /// `addr` is `host:port` or a `redis://` URL
    pub fn new(
        addr: &str,
        user: Option<String>,
        password: Option<String>,
        db: Option<i64>,
    ) -> BackendResult<Self> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        };
        let mut info = url.as_str().into_connection_info()?;
        if user.is_some() {
            info.redis.username = user;
        }
        if password.is_some() {
            info.redis.password = password;
        }
        if let Some(db) = db {
            info.redis.db = db;
        }

        let label = format!("redis at {}", info.addr);
        Ok(Self { info, label })
    }
}

impl Connector for RedisConnector {
    type Handle = RedisClient;

    fn backend(&self) -> &str {
        &self.label
    }

    fn connect(&self) -> BoxFuture<'_, BackendResult<RedisClient>> {
        Box::pin(async move {
            let client = redis::Client::open(self.info.clone())?;
            let manager = ConnectionManager::new(client).await?;
            Ok(RedisClient { manager })
        })
    }

    fn probe<'a>(&'a self, handle: &'a RedisClient) -> BoxFuture<'a, BackendResult<()>> {
        handle.ping()
    }

    fn discard(&self, handle: RedisClient) -> BoxFuture<'_, ()> {
        Box::pin(async move { drop(handle) })
    }
}

/// Multiplexed Valkey/Redis client; cheap to clone per call
pub struct RedisClient {
    manager: ConnectionManager,
}

impl KvClient for RedisClient {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("EX").arg(ttl.as_secs());
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, BackendResult<Vec<Option<String>>>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let values: Vec<Option<String>> =
                redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
            Ok(values)
        })
    }

    fn command<'a>(&'a self, name: &'a str, args: &'a [String]) -> BoxFuture<'a, BackendResult<Value>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let mut cmd = redis::cmd(name);
            for arg in args {
                cmd.arg(arg);
            }
            let value: RedisValue = cmd.query_async(&mut conn).await?;
            reply_to_json(value)
        })
    }

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        // the manager's connection closes when the last clone drops
        Box::pin(async { info!("redis connection released") })
    }
}

/// Render a server reply as JSON
fn reply_to_json(value: RedisValue) -> BackendResult<Value> {
    Ok(match value {
        RedisValue::Nil => Value::Null,
        RedisValue::Int(n) => Value::from(n),
        RedisValue::Double(f) => Value::from(f),
        RedisValue::Boolean(b) => Value::Bool(b),
        RedisValue::Okay => Value::String("OK".to_string()),
        RedisValue::SimpleString(s) => Value::String(s),
        RedisValue::VerbatimString { text, .. } => Value::String(text),
        RedisValue::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(STANDARD.encode(e.into_bytes())),
        },
        RedisValue::Array(items) | RedisValue::Set(items) => Value::Array(
            items
                .into_iter()
                .map(reply_to_json)
                .collect::<BackendResult<_>>()?,
        ),
        RedisValue::Map(pairs) => {
            let mut map = Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = match reply_to_json(k)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, reply_to_json(v)?);
            }
            Value::Object(map)
        }
        RedisValue::ServerError(e) => return Err(BackendError::driver(format!("{:?}", e))),
        other => Value::String(format!("{:?}", other)),
    })
}
