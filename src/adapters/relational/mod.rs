//! Relational adapter
//!
//! `/query`, `/exec`, `/schema` and `/health` over any [`SqlClient`]. Bodies
//! are `{"sql": ..., "args": [...]}`; anything that does not decode is taken
//! as literal SQL with no arguments.

mod postgres;

pub use postgres::{PostgresClient, PostgresConnector};

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapters::{BackendResult, RowSet};
use crate::dispatch::{Adapter, BridgeError, OperationResult, Reply, RequestContext, RouteTable};
use crate::kind::BackendKind;

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Command tag, e.g. `INSERT 0 1`
    pub command: String,
}

/// Relational backend capability
pub trait SqlClient: Send + Sync + 'static {
    fn query<'a>(&'a self, sql: &'a str, args: &'a [Value]) -> BoxFuture<'a, BackendResult<RowSet>>;

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, BackendResult<ExecOutcome>>;

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Columns of every user table, in table then column order
const SCHEMA_SQL: &str = "SELECT table_schema, table_name, column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY table_schema, table_name, ordinal_position";

/// Fold `information_schema.columns` rows into one entry per table
fn group_columns(rows: Vec<Map<String, Value>>) -> Vec<Value> {
    let mut tables: Vec<Value> = Vec::new();
    for row in rows {
        let text = |name: &str| row.get(name).cloned().unwrap_or(Value::Null);
        let (schema, table) = (text("table_schema"), text("table_name"));
        let column = json!({
            "name": text("column_name"),
            "type": text("data_type"),
            "nullable": row.get("is_nullable").and_then(Value::as_str) == Some("YES"),
        });

        let same_table = tables
            .last()
            .is_some_and(|last| last["schema"] == schema && last["table"] == table);
        if !same_table {
            tables.push(json!({ "schema": schema, "table": table, "columns": [] }));
        }
        if let Some(Value::Array(columns)) = tables.last_mut().and_then(|t| t.get_mut("columns")) {
            columns.push(column);
        }
    }
    tables
}

#[derive(Debug, Deserialize)]
struct SqlRequest {
    sql: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl SqlRequest {
    fn decode(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self {
            sql: String::from_utf8_lossy(body).into_owned(),
            args: Vec::new(),
        })
    }
}

/// Relational bridge adapter
pub struct RelationalAdapter<C> {
    client: C,
}

impl<C: SqlClient> RelationalAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn query(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req = SqlRequest::decode(&body);
            let rows = self
                .client
                .query(&req.sql, &req.args)
                .await
                .map_err(BridgeError::backend)?;
            let rows = rows.into_objects();
            Ok(Reply::ok(&json!({
                "count": rows.len(),
                "rows": rows,
            })))
        })
    }

    fn exec(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req = SqlRequest::decode(&body);
            let outcome = self
                .client
                .execute(&req.sql, &req.args)
                .await
                .map_err(BridgeError::backend)?;
            Ok(Reply::ok(&json!({
                "rows_affected": outcome.rows_affected,
                "command": outcome.command,
            })))
        })
    }

    fn schema(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let rows = self
                .client
                .query(SCHEMA_SQL, &[])
                .await
                .map_err(BridgeError::backend)?;
            let tables = group_columns(rows.into_objects());
            Ok(Reply::ok(&json!({
                "count": tables.len(),
                "tables": tables,
            })))
        })
    }

    fn health(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            self.client.ping().await.map_err(BridgeError::unavailable)?;
            Ok(Reply::ok(&json!({
                "status": "ok",
                "service": BackendKind::Sql.service_name(),
            })))
        })
    }
}

impl<C: SqlClient> Adapter for RelationalAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Sql
    }

    fn routes(&self) -> RouteTable<Self> {
        RouteTable::new()
            .route("/query", Self::query)
            .route("/exec", Self::exec)
            .route("/schema", Self::schema)
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
    use crate::adapters::BackendError;
    use crate::dispatch::{Bridge, Dispatcher};
    use std::sync::Mutex;

    /// Records the last statement; returns a fixed two-row result
    #[derive(Default)]
    struct FakeSql {
        seen: Mutex<Vec<(String, Vec<Value>)>>,
        down: bool,
    }

    impl SqlClient for FakeSql {
        fn query<'a>(&'a self, sql: &'a str, args: &'a [Value]) -> BoxFuture<'a, BackendResult<RowSet>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push((sql.to_string(), args.to_vec()));
                if sql.contains("empty") {
                    return Ok(RowSet::new(vec!["id".into()]));
                }
                if sql.contains("bad") {
                    return Err(BackendError::driver("syntax error at or near \"bad\""));
                }
                if sql.contains("information_schema") {
                    return Ok(RowSet {
                        columns: ["table_schema", "table_name", "column_name", "data_type", "is_nullable"]
                            .map(String::from)
                            .to_vec(),
                        rows: vec![
                            ["public", "users", "id", "bigint", "NO"].map(|v| json!(v)).to_vec(),
                            ["public", "users", "email", "text", "YES"].map(|v| json!(v)).to_vec(),
                            ["public", "orders", "id", "bigint", "NO"].map(|v| json!(v)).to_vec(),
                        ],
                    });
                }
                Ok(RowSet {
                    columns: vec!["id".into(), "name".into()],
                    rows: vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
                })
            })
        }

        fn execute<'a>(
            &'a self,
            sql: &'a str,
            args: &'a [Value],
        ) -> BoxFuture<'a, BackendResult<ExecOutcome>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push((sql.to_string(), args.to_vec()));
                Ok(ExecOutcome {
                    rows_affected: 3,
                    command: "UPDATE 3".into(),
                })
            })
        }

        fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
            Box::pin(async move {
                if self.down {
                    Err(BackendError::driver("connection refused"))
                } else {
                    Ok(())
                }
            })
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    fn bridge(client: FakeSql) -> Dispatcher<RelationalAdapter<FakeSql>> {
        Dispatcher::new(RelationalAdapter::new(client))
    }

    fn last_statement(d: &Dispatcher<RelationalAdapter<FakeSql>>) -> (String, Vec<Value>) {
        d.adapter().client.seen.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_query_rows_keyed_by_column() {
        let d = bridge(FakeSql::default());
        let body = json!({"sql": "SELECT id, name FROM t WHERE id > $1", "args": [0]});
        let reply = d.handle("/query", Bytes::from(body.to_string())).await;

        assert_eq!(reply.status(), 200);
        let value = reply.body_json().unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["rows"][1], json!({"id": 2, "name": "b"}));
        assert_eq!(last_statement(&d).1, vec![json!(0)]);
    }

    #[tokio::test]
    async fn test_raw_body_is_literal_sql() {
        let d = bridge(FakeSql::default());
        d.handle("/query", Bytes::from_static(b"SELECT 1")).await;
        assert_eq!(last_statement(&d), ("SELECT 1".to_string(), vec![]));
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_list() {
        let d = bridge(FakeSql::default());
        let reply = d.handle("/query", Bytes::from_static(b"SELECT empty")).await;
        assert_eq!(reply.body_json().unwrap(), json!({"rows": [], "count": 0}));
    }

    #[tokio::test]
    async fn test_driver_error_is_500_with_message() {
        let d = bridge(FakeSql::default());
        let reply = d.handle("/query", Bytes::from_static(b"bad")).await;
        assert_eq!(reply.status(), 500);
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"error": "syntax error at or near \"bad\""})
        );
    }

    #[tokio::test]
    async fn test_exec_reports_rows_affected_and_tag() {
        let d = bridge(FakeSql::default());
        let body = json!({"sql": "UPDATE t SET x = 1"});
        let reply = d.handle("/exec", Bytes::from(body.to_string())).await;
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"rows_affected": 3, "command": "UPDATE 3"})
        );
    }

    #[tokio::test]
    async fn test_unknown_path_with_body_runs_query() {
        let d = bridge(FakeSql::default());
        let reply = d.handle("", Bytes::from_static(b"SELECT 1")).await;
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.body_json().unwrap()["count"], 2);
    }

    #[tokio::test]
    async fn test_schema_groups_columns_by_table() {
        let d = bridge(FakeSql::default());
        let reply = d.handle("/schema", Bytes::new()).await;

        assert_eq!(reply.status(), 200);
        assert_eq!(
            reply.body_json().unwrap(),
            json!({
                "count": 2,
                "tables": [
                    {"schema": "public", "table": "users", "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                        {"name": "email", "type": "text", "nullable": true},
                    ]},
                    {"schema": "public", "table": "orders", "columns": [
                        {"name": "id", "type": "bigint", "nullable": false},
                    ]},
                ]
            })
        );
        assert_eq!(last_statement(&d), (SCHEMA_SQL.to_string(), vec![]));
    }

    #[tokio::test]
    async fn test_health() {
        let reply = bridge(FakeSql::default()).handle("/health", Bytes::new()).await;
        assert_eq!(
            reply.body_json().unwrap(),
            json!({"status": "ok", "service": "zap-sql"})
        );

        let down = FakeSql {
            down: true,
            ..FakeSql::default()
        };
        let reply = bridge(down).handle("/health", Bytes::new()).await;
        assert_eq!(reply.status(), 503);
    }
}
