//! Native-protocol columnar adapter

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bind_positional, InsertPlan, NativeColumnarClient, QueryRequest};
use crate::dispatch::{Adapter, BridgeError, OperationResult, Reply, RequestContext, RouteTable};
use crate::kind::BackendKind;

const TABLES_SQL: &str =
    "SELECT name, engine, total_rows, total_bytes FROM system.tables WHERE database = ? ORDER BY name";

#[derive(Debug, Deserialize)]
struct ExecRequest {
    sql: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TablesRequest {
    #[serde(default)]
    database: Option<String>,
}

/// Columnar bridge adapter over the native protocol
pub struct NativeColumnarAdapter<C> {
    client: C,
    database: String,
}

impl<C: NativeColumnarClient> NativeColumnarAdapter<C> {
    pub fn new(client: C, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    fn query(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req = QueryRequest::decode(&body);
            let rows = self.client.query(&req.sql).await.map_err(BridgeError::gateway)?;
            let rows = rows.into_objects();
            Ok(Reply::ok(&json!({
                "count": rows.len(),
                "rows": rows,
            })))
        })
    }

    fn exec(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: ExecRequest = serde_json::from_slice(&body)?;
            let sql = bind_positional(&req.sql, &req.args)?;
            self.client.execute(&sql).await.map_err(BridgeError::gateway)?;
            Ok(Reply::ok(&json!({ "status": "ok" })))
        })
    }

    fn insert(&self, ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let plan = InsertPlan::from_body(&body, &self.database)?;
            let mut batch = self
                .client
                .prepare_batch(&plan)
                .await
                .map_err(BridgeError::gateway)?;

            for row in &plan.rows {
                batch
                    .append(plan.project(row))
                    .map_err(|e| BridgeError::invalid_request(format!("row append: {}", e)))?;
            }
            batch.send().await.map_err(BridgeError::gateway)?;

            tracing::debug!(
                request_id = %ctx.request_id(),
                table = %plan.target.sql(),
                rows = plan.rows.len(),
                "batch sent"
            );
            Ok(Reply::ok(&json!({
                "status": "ok",
                "inserted": plan.rows.len(),
            })))
        })
    }

    fn tables(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: TablesRequest = serde_json::from_slice(&body).unwrap_or_default();
            let database = req
                .database
                .filter(|db| !db.is_empty())
                .unwrap_or_else(|| self.database.clone());

            let sql = bind_positional(TABLES_SQL, &[Value::String(database.clone())])?;
            let rows = self.client.query(&sql).await.map_err(BridgeError::gateway)?;
            Ok(Reply::ok(&json!({
                "database": database,
                "tables": rows.into_objects(),
            })))
        })
    }

    fn health(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            self.client.ping().await.map_err(BridgeError::unavailable)?;
            let version = self.client.server_version().await.unwrap_or_default();
            Ok(Reply::ok(&json!({
                "status": "ok",
                "service": BackendKind::Datastore.service_name(),
                "native": true,
                "version": version,
            })))
        })
    }
}

impl<C: NativeColumnarClient> Adapter for NativeColumnarAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Datastore
    }

    fn routes(&self) -> RouteTable<Self> {
        RouteTable::new()
            .route("/query", Self::query)
            .route("/exec", Self::exec)
            .route_with_timeout("/insert", Self::insert, Duration::from_secs(60))
            .route_with_timeout("/tables", Self::tables, Duration::from_secs(10))
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
    use crate::adapters::columnar::ColumnarBatch;
    use crate::adapters::{BackendError, BackendResult, RowSet};
    use crate::dispatch::{Bridge, Dispatcher};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<String>>,
        sent: Mutex<Vec<(String, Vec<Vec<Value>>)>>,
    }

    struct FakeNative {
        recorder: Arc<Recorder>,
    }

    struct FakeBatch {
        statement: String,
        rows: Vec<Vec<Value>>,
        recorder: Arc<Recorder>,
    }

    impl ColumnarBatch for FakeBatch {
        fn append(&mut self, row: Vec<Value>) -> BackendResult<()> {
            if row.iter().any(Value::is_object) {
                return Err(BackendError::value("cannot convert object to UInt64"));
            }
            self.rows.push(row);
            Ok(())
        }

        fn send(self: Box<Self>) -> BoxFuture<'static, BackendResult<()>> {
            Box::pin(async move {
                self.recorder
                    .sent
                    .lock()
                    .unwrap()
                    .push((self.statement, self.rows));
                Ok(())
            })
        }
    }

    impl NativeColumnarClient for FakeNative {
        fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<RowSet>> {
            Box::pin(async move {
                self.recorder.statements.lock().unwrap().push(sql.to_string());
                if sql.starts_with("SELECT name, engine") {
                    return Ok(RowSet {
                        columns: vec![
                            "name".into(),
                            "engine".into(),
                            "total_rows".into(),
                            "total_bytes".into(),
                        ],
                        rows: vec![vec![json!("events"), json!("MergeTree"), json!(2), json!(512)]],
                    });
                }
                if sql.contains("broken") {
                    return Err(BackendError::driver("Code: 62. Syntax error"));
                }
                Ok(RowSet {
                    columns: vec!["n".into()],
                    rows: vec![vec![json!(1)]],
                })
            })
        }

        fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>> {
            Box::pin(async move {
                self.recorder.statements.lock().unwrap().push(sql.to_string());
                Ok(())
            })
        }

        fn prepare_batch<'a>(
            &'a self,
            plan: &'a InsertPlan,
        ) -> BoxFuture<'a, BackendResult<Box<dyn ColumnarBatch>>> {
            Box::pin(async move {
                Ok(Box::new(FakeBatch {
                    statement: plan.statement(),
                    rows: Vec::new(),
                    recorder: self.recorder.clone(),
                }) as Box<dyn ColumnarBatch>)
            })
        }

        fn server_version(&self) -> BoxFuture<'_, BackendResult<String>> {
            Box::pin(async { Ok("24.3.1".to_string()) })
        }

        fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    fn bridge() -> (Dispatcher<NativeColumnarAdapter<FakeNative>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let client = FakeNative {
            recorder: recorder.clone(),
        };
        (Dispatcher::new(NativeColumnarAdapter::new(client, "default")), recorder)
    }

    async fn call(d: &Dispatcher<NativeColumnarAdapter<FakeNative>>, path: &str, body: Value) -> Reply {
        d.handle(path, Bytes::from(body.to_string())).await
    }

    #[tokio::test]
    async fn test_insert_reports_row_count() {
        let (d, recorder) = bridge();
        let reply = call(
            &d,
            "/insert",
            json!({"table": "events", "rows": [{"id": 1}, {"id": 2}]}),
        )
        .await;

        assert_eq!(reply.status(), 200);
        assert_eq!(reply.body_json().unwrap(), json!({"status": "ok", "inserted": 2}));
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, "INSERT INTO `events` (`id`)");
        assert_eq!(sent[0].1, vec![vec![json!(1)], vec![json!(2)]]);
    }

    #[tokio::test]
    async fn test_append_failure_aborts_whole_batch() {
        let (d, recorder) = bridge();
        let reply = call(
            &d,
            "/insert",
            json!({"table": "events", "rows": [{"id": 1}, {"id": {"nested": true}}]}),
        )
        .await;

        assert_eq!(reply.status(), 400);
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"error": "row append: cannot convert object to UInt64"})
        );
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exec_binds_placeholders() {
        let (d, recorder) = bridge();
        let reply = call(
            &d,
            "/exec",
            json!({"sql": "ALTER TABLE t DELETE WHERE id = ?", "args": [7]}),
        )
        .await;
        assert_eq!(reply.body_json().unwrap(), json!({"status": "ok"}));
        assert_eq!(
            recorder.statements.lock().unwrap().last().unwrap(),
            "ALTER TABLE t DELETE WHERE id = 7"
        );
    }

    #[tokio::test]
    async fn test_exec_requires_json() {
        let (d, _) = bridge();
        let reply = d.handle("/exec", Bytes::from_static(b"DROP TABLE t")).await;
        assert_eq!(reply.status(), 400);
    }

    #[tokio::test]
    async fn test_query_error_is_502() {
        let (d, _) = bridge();
        let reply = d.handle("/query", Bytes::from_static(b"SELECT broken")).await;
        assert_eq!(reply.status(), 502);
    }

    #[tokio::test]
    async fn test_raw_body_falls_back_to_query() {
        let (d, _) = bridge();
        let reply = d.handle("", Bytes::from_static(b"SELECT 1 AS n")).await;
        assert_eq!(reply.body_json().unwrap(), json!({"rows": [{"n": 1}], "count": 1}));
    }

    #[tokio::test]
    async fn test_tables_uses_requested_or_default_database() {
        let (d, recorder) = bridge();
        let reply = d.handle("/tables", Bytes::new()).await;
        let value = reply.body_json().unwrap();
        assert_eq!(value["database"], "default");
        assert_eq!(value["tables"][0]["engine"], "MergeTree");
        assert!(recorder
            .statements
            .lock()
            .unwrap()
            .last()
            .unwrap()
            .ends_with("WHERE database = 'default' ORDER BY name"));

        let reply = call(&d, "/tables", json!({"database": "logs"})).await;
        assert_eq!(reply.body_json().unwrap()["database"], "logs");
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let (d, _) = bridge();
        let reply = d.handle("/health", Bytes::new()).await;
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"status": "ok", "service": "zap-datastore", "native": true, "version": "24.3.1"})
        );
    }
}
