//! HTTP-interface columnar adapter

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use super::{HttpColumnarClient, InsertPlan, QueryRequest};
use crate::dispatch::{
    Adapter, BridgeError, ContentType, OperationResult, Reply, RequestContext, RouteTable,
};
use crate::kind::BackendKind;

/// Columnar bridge adapter over the HTTP interface
pub struct HttpColumnarAdapter<C> {
    client: C,
    database: String,
}

impl<C: HttpColumnarClient> HttpColumnarAdapter<C> {
    pub fn new(client: C, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    fn query(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req = QueryRequest::decode(&body);
            let output = self
                .client
                .query_ndjson(&req.sql)
                .await
                .map_err(BridgeError::gateway)?;

            if req.raw {
                return Ok(Reply::raw(200, output, ContentType::NdJson));
            }
            let rows = parse_ndjson(&output)?;
            Ok(Reply::ok(&json!({
                "count": rows.len(),
                "rows": rows,
            })))
        })
    }

    fn insert(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let plan = InsertPlan::from_body(&body, &self.database)?;
            let rows = Bytes::from(plan.to_ndjson()?);
            self.client
                .insert_ndjson(&plan.statement(), rows)
                .await
                .map_err(BridgeError::gateway)?;
            Ok(Reply::ok(&json!({
                "status": "ok",
                "inserted": plan.rows.len(),
            })))
        })
    }

    fn health(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            self.client.ping().await.map_err(BridgeError::unavailable)?;
            Ok(Reply::ok(&json!({
                "status": "ok",
                "service": BackendKind::Datastore.service_name(),
                "native": false,
            })))
        })
    }
}

/// One JSON value per non-empty line
fn parse_ndjson(output: &[u8]) -> Result<Vec<Value>, BridgeError> {
    output
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| {
            serde_json::from_slice(line)
                .map_err(|e| BridgeError::gateway(format!("unreadable backend row: {}", e)))
        })
        .collect()
}

impl<C: HttpColumnarClient> Adapter for HttpColumnarAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Datastore
    }

    fn routes(&self) -> RouteTable<Self> {
        RouteTable::new()
            .route("/query", Self::query)
            .route_with_timeout("/insert", Self::insert, Duration::from_secs(60))
            .route_with_timeout("/health", Self::health, Duration::from_secs(5))
            .fallback("/query")
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.client.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BackendError, BackendResult};
    use crate::dispatch::{Bridge, Dispatcher};
    use std::sync::Mutex;

    const OUTPUT: &[u8] = b"{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n";

    #[derive(Default)]
    struct FakeHttp {
        inserts: Mutex<Vec<(String, Bytes)>>,
    }

    impl HttpColumnarClient for FakeHttp {
        fn query_ndjson<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<Bytes>> {
            Box::pin(async move {
                if sql.contains("missing") {
                    return Err(BackendError::driver("HTTP 404: Table default.missing does not exist"));
                }
                Ok(Bytes::from_static(OUTPUT))
            })
        }

        fn insert_ndjson<'a>(&'a self, statement: &'a str, rows: Bytes) -> BoxFuture<'a, BackendResult<()>> {
            Box::pin(async move {
                self.inserts.lock().unwrap().push((statement.to_string(), rows));
                Ok(())
            })
        }

        fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    fn bridge() -> Dispatcher<HttpColumnarAdapter<FakeHttp>> {
        Dispatcher::new(HttpColumnarAdapter::new(FakeHttp::default(), "default"))
    }

    #[tokio::test]
    async fn test_query_parses_rows() {
        let reply = bridge().handle("/query", Bytes::from_static(b"SELECT * FROM t")).await;
        let value = reply.body_json().unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["rows"][0], json!({"id": 1, "name": "a"}));
    }

    #[tokio::test]
    async fn test_raw_query_is_passthrough_ndjson() {
        let body = json!({"sql": "SELECT * FROM t", "raw": true}).to_string();
        let reply = bridge().handle("/query", Bytes::from(body)).await;
        assert_eq!(reply.content_type(), ContentType::NdJson);
        assert_eq!(&reply.body()[..], OUTPUT);
    }

    #[tokio::test]
    async fn test_backend_error_is_502() {
        let reply = bridge().handle("/query", Bytes::from_static(b"SELECT * FROM missing")).await;
        assert_eq!(reply.status(), 502);
    }

    #[tokio::test]
    async fn test_insert_posts_projected_ndjson() {
        let d = bridge();
        let body = json!({"table": "events", "database": "logs", "rows": [{"id": 1}, {"id": 2}]});
        let reply = d.handle("/insert", Bytes::from(body.to_string())).await;

        assert_eq!(reply.body_json().unwrap(), json!({"status": "ok", "inserted": 2}));
        let inserts = d.adapter().client.inserts.lock().unwrap();
        assert_eq!(inserts[0].0, "INSERT INTO `logs`.`events` (`id`)");
        assert_eq!(&inserts[0].1[..], b"{\"id\":1}\n{\"id\":2}\n");
    }

    #[tokio::test]
    async fn test_no_exec_route() {
        let reply = bridge().handle("/exec", Bytes::new()).await;
        assert_eq!(reply.status(), 404);
    }

    #[tokio::test]
    async fn test_health_is_not_native() {
        let reply = bridge().handle("/health", Bytes::new()).await;
        assert_eq!(reply.body_json().unwrap()["native"], false);
    }
}
