//! ClickHouse native-protocol client
//!
//! Requests share a small pool of native connections; a connection the
//! server dropped is replaced the next time it is checked out. Query blocks
//! are flattened into rows, and insert batches are typed from
//! `system.columns` so every appended value is converted before anything is
//! sent.

use std::collections::HashMap;
use std::time::Duration;

use deadpool::managed::{Manager, Metrics, Object, Pool, RecycleError, RecycleResult};
use deadpool::Runtime;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use indexmap::IndexMap;
use klickhouse::block::Block;
use klickhouse::{Client, ClientOptions, KlickhouseError, Value as ChValue};
use serde_json::Value;
use tracing::info;

use super::clickhouse_types::{to_json, ColumnType};
use super::{bind_positional, literal, quote_ident, ColumnarBatch, InsertPlan, NativeColumnarClient};
use crate::adapters::{BackendError, BackendResult, RowSet};
use crate::bootstrap::Connector;

const COLUMNS_SQL: &str = "SELECT name, type FROM system.columns WHERE database = ? AND table = ?";

/// Open native connections per sidecar
pub const POOL_SIZE: usize = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the connection pool during bootstrap
pub struct NativeClickHouseConnector {
    addr: String,
    options: ClientOptions,
    database: String,
}

impl NativeClickHouseConnector {
    /// `addr` is `host:port` of the native TCP endpoint
    pub fn new(
        addr: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        let addr = addr
            .trim_start_matches("clickhouse://")
            .trim_start_matches("tcp://")
            .to_string();
        let database = database.into();
        Self {
            addr,
            options: ClientOptions {
                username: user.into(),
                password: password.into(),
                default_database: database.clone(),
                ..ClientOptions::default()
            },
            database,
        }
    }
}

impl Connector for NativeClickHouseConnector {
    type Handle = NativeClickHouse;

    fn backend(&self) -> &str {
        &self.addr
    }

    fn connect(&self) -> BoxFuture<'_, BackendResult<NativeClickHouse>> {
        Box::pin(async move {
            let manager = ClickHouseManager {
                addr: self.addr.clone(),
                options: self.options.clone(),
            };
            let pool = Pool::builder(manager)
                .max_size(POOL_SIZE)
                .create_timeout(Some(CONNECT_TIMEOUT))
                .runtime(Runtime::Tokio1)
                .build()?;
            Ok(NativeClickHouse {
                pool,
                database: self.database.clone(),
            })
        })
    }

    fn probe<'a>(&'a self, handle: &'a NativeClickHouse) -> BoxFuture<'a, BackendResult<()>> {
        handle.ping()
    }

    fn discard(&self, handle: NativeClickHouse) -> BoxFuture<'_, ()> {
        Box::pin(async move { handle.pool.close() })
    }
}

/// Opens native connections for the pool
pub struct ClickHouseManager {
    addr: String,
    options: ClientOptions,
}

impl Manager for ClickHouseManager {
    type Type = Client;
    type Error = KlickhouseError;

    async fn create(&self) -> Result<Client, KlickhouseError> {
        Client::connect(self.addr.as_str(), self.options.clone()).await
    }

    async fn recycle(&self, client: &mut Client, _: &Metrics) -> RecycleResult<KlickhouseError> {
        reusable(&*client)
    }
}

/// A pooled connection that can tell whether its peer went away
trait Liveness {
    fn is_closed(&self) -> bool;
}

impl Liveness for Client {
    fn is_closed(&self) -> bool {
        Client::is_closed(self)
    }
}

/// Closed connections fail recycling so the pool opens a fresh one
fn reusable<C: Liveness, E>(conn: &C) -> RecycleResult<E> {
    if conn.is_closed() {
        Err(RecycleError::message("connection closed by server"))
    } else {
        Ok(())
    }
}

/// Pooled native ClickHouse client
pub struct NativeClickHouse {
    pool: Pool<ClickHouseManager>,
    database: String,
}

impl NativeClickHouse {
    async fn fetch(&self, sql: &str) -> BackendResult<RowSet> {
        let client = self.pool.get().await?;
        fetch(&client, sql).await
    }
}

async fn fetch(client: &Client, sql: &str) -> BackendResult<RowSet> {
    let mut blocks = Box::pin(client.query_raw(sql).await?);
    let mut set = RowSet::default();

    while let Some(block) = blocks.next().await {
        let block = block?;
        if set.columns.is_empty() {
            set.columns = block.column_types.keys().cloned().collect();
        }
        let rows = block.rows as usize;
        let mut columns: Vec<_> = block
            .column_data
            .into_iter()
            .map(|(_, values)| values.into_iter())
            .collect();
        for _ in 0..rows {
            set.rows.push(
                columns
                    .iter_mut()
                    .map(|c| c.next().map_or(Value::Null, to_json))
                    .collect(),
            );
        }
    }
    Ok(set)
}

async fn column_types(
    client: &Client,
    database: &str,
    table: &str,
) -> BackendResult<HashMap<String, ColumnType>> {
    let sql = bind_positional(
        COLUMNS_SQL,
        &[Value::String(database.to_string()), Value::String(table.to_string())],
    )
    .map_err(|e| BackendError::value(e.to_string()))?;

    let mut types = HashMap::new();
    for row in fetch(client, &sql).await?.rows {
        if let [Value::String(name), Value::String(ty)] = row.as_slice() {
            let parsed = ColumnType::parse(ty)
                .map_err(|e| BackendError::driver(format!("column {}: {}", name, e)))?;
            types.insert(name.clone(), parsed);
        }
    }
    Ok(types)
}

/// Native insert statement. Tables with enum columns read the block through
/// `input()` so the server casts labels to the enum.
fn insert_statement(plan: &InsertPlan, columns: &[(String, ColumnType)]) -> String {
    if !columns.iter().any(|(_, ty)| ty.is_enum()) {
        return format!("{} FORMAT native", plan.statement());
    }
    let names: Vec<String> = columns.iter().map(|(name, _)| quote_ident(name)).collect();
    let structure: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.wire))
        .collect();
    format!(
        "{} SELECT {} FROM input({}) FORMAT native",
        plan.statement(),
        names.join(", "),
        literal(&Value::String(structure.join(", ")))
    )
}

impl NativeColumnarClient for NativeClickHouse {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<RowSet>> {
        Box::pin(self.fetch(sql))
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let client = self.pool.get().await?;
            client.execute(sql).await?;
            Ok(())
        })
    }

    fn prepare_batch<'a>(
        &'a self,
        plan: &'a InsertPlan,
    ) -> BoxFuture<'a, BackendResult<Box<dyn ColumnarBatch>>> {
        Box::pin(async move {
            let client = self.pool.get().await?;
            let mut types = column_types(&client, &plan.target.database, &plan.target.table).await?;
            if types.is_empty() {
                return Err(BackendError::driver(format!(
                    "table {} does not exist",
                    plan.target.sql()
                )));
            }

            let mut columns = Vec::with_capacity(plan.columns.len());
            for name in &plan.columns {
                let ty = types.remove(name).ok_or_else(|| {
                    BackendError::driver(format!("no column {} in {}", name, plan.target.sql()))
                })?;
                columns.push((name.clone(), ty));
            }

            Ok(Box::new(NativeBatch {
                client,
                statement: insert_statement(plan, &columns),
                data: vec![Vec::with_capacity(plan.rows.len()); columns.len()],
                columns,
                rows: 0,
            }) as Box<dyn ColumnarBatch>)
        })
    }

    fn server_version(&self) -> BoxFuture<'_, BackendResult<String>> {
        Box::pin(async move {
            let set = self.fetch("SELECT version()").await?;
            Ok(set
                .rows
                .first()
                .and_then(|row| row.first())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string())
        })
    }

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            self.fetch("SELECT 1").await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.pool.close();
            info!(database = %self.database, "clickhouse pool closed");
        })
    }
}

/// Typed column buffers for one insert, bound to one pooled connection
struct NativeBatch {
    client: Object<ClickHouseManager>,
    statement: String,
    columns: Vec<(String, ColumnType)>,
    data: Vec<Vec<ChValue>>,
    rows: u64,
}

impl ColumnarBatch for NativeBatch {
    fn append(&mut self, row: Vec<Value>) -> BackendResult<()> {
        if row.len() != self.columns.len() {
            return Err(BackendError::value(format!(
                "expected {} values, got {}",
                self.columns.len(),
                row.len()
            )));
        }

        // convert the whole row first so a failure leaves no partial row
        let converted = row
            .iter()
            .zip(&self.columns)
            .map(|(value, (name, ty))| {
                ty.convert(value)
                    .map_err(|e| BackendError::value(format!("column {}: {}", name, e)))
            })
            .collect::<BackendResult<Vec<_>>>()?;

        for (column, value) in self.data.iter_mut().zip(converted) {
            column.push(value);
        }
        self.rows += 1;
        Ok(())
    }

    fn send(self: Box<Self>) -> BoxFuture<'static, BackendResult<()>> {
        Box::pin(async move {
            let NativeBatch {
                client,
                statement,
                columns,
                data,
                rows,
            } = *self;

            let mut column_types = IndexMap::with_capacity(columns.len());
            let mut column_data = IndexMap::with_capacity(columns.len());
            for ((name, ty), values) in columns.into_iter().zip(data) {
                column_types.insert(name.clone(), ty.wire);
                column_data.insert(name, values);
            }
            let block = Block {
                info: Default::default(),
                rows,
                column_types,
                column_data,
            };

            let mut responses = Box::pin(
                client
                    .insert_native_raw(statement, futures_util::stream::iter(vec![block]))
                    .await?,
            );
            while let Some(response) = responses.next().await {
                response?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::adapters::columnar::TableRef;
    use klickhouse::Type;
    use serde_json::json;

    struct FakeConn {
        id: usize,
        closed: Arc<AtomicBool>,
    }

    impl Liveness for FakeConn {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeManager {
        opened: AtomicUsize,
    }

    impl Manager for FakeManager {
        type Type = FakeConn;
        type Error = KlickhouseError;

        async fn create(&self) -> Result<FakeConn, KlickhouseError> {
            Ok(FakeConn {
                id: self.opened.fetch_add(1, Ordering::SeqCst) + 1,
                closed: Arc::new(AtomicBool::new(false)),
            })
        }

        async fn recycle(&self, conn: &mut FakeConn, _: &Metrics) -> RecycleResult<KlickhouseError> {
            reusable(&*conn)
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_is_replaced() {
        let pool: Pool<FakeManager> = Pool::builder(FakeManager::default()).max_size(1).build().unwrap();

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 1);
        drop(conn);

        // a healthy connection is reused
        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 1);
        conn.closed.store(true, Ordering::SeqCst);
        drop(conn);

        let conn = pool.get().await.unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 2);
    }

    fn plan(columns: &[&str]) -> InsertPlan {
        InsertPlan {
            target: TableRef {
                database: "default".into(),
                table: "events".into(),
                qualified: false,
            },
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![json!({"ts": 1}).as_object().cloned().unwrap()],
        }
    }

    #[test]
    fn test_plain_insert_statement() {
        let columns = vec![("ts".to_string(), ColumnType::new(Type::UInt64))];
        assert_eq!(
            insert_statement(&plan(&["ts"]), &columns),
            "INSERT INTO `events` (`ts`) FORMAT native"
        );
    }

    #[test]
    fn test_enum_insert_reads_through_input() {
        let columns = vec![
            ("ts".to_string(), ColumnType::new(Type::UInt64)),
            ("level".to_string(), ColumnType::parse("Enum8('info' = 1, 'warn' = 2)").unwrap()),
        ];
        assert_eq!(
            insert_statement(&plan(&["ts", "level"]), &columns),
            "INSERT INTO `events` (`ts`, `level`) SELECT `ts`, `level` \
             FROM input('`ts` UInt64, `level` String') FORMAT native"
        );
    }
}
