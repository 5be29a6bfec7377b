//! Columnar adapter
//!
//! Two transports share one contract: the native variant talks the binary
//! protocol and inserts through typed batches; the HTTP variant posts SQL
//! and newline-delimited JSON. Backend failures are reported as 502.

mod clickhouse_http;
mod clickhouse_native;
mod clickhouse_types;
mod http;
mod insert;
mod native;
mod sql;

pub use clickhouse_http::{HttpClickHouse, HttpClickHouseConnector};
pub use clickhouse_native::{NativeClickHouse, NativeClickHouseConnector};
pub use http::HttpColumnarAdapter;
pub use insert::{InsertPlan, InsertRequest, TableRef};
pub use native::NativeColumnarAdapter;
pub use sql::{bind_positional, literal, quote_ident};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{BackendResult, RowSet};

/// Database used when none is configured
pub const DEFAULT_DATABASE: &str = "default";

/// User used when none is configured
pub const DEFAULT_USER: &str = "default";

/// Native-protocol backend capability
pub trait NativeColumnarClient: Send + Sync + 'static {
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<RowSet>>;

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>>;

    /// Open a batch for `plan`'s table and columns
    fn prepare_batch<'a>(
        &'a self,
        plan: &'a InsertPlan,
    ) -> BoxFuture<'a, BackendResult<Box<dyn ColumnarBatch>>>;

    fn server_version(&self) -> BoxFuture<'_, BackendResult<String>>;

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Rows buffered client-side and sent in one go; dropping it discards them
pub trait ColumnarBatch: Send {
    /// Append one row, values in column order
    fn append(&mut self, row: Vec<Value>) -> BackendResult<()>;

    fn send(self: Box<Self>) -> BoxFuture<'static, BackendResult<()>>;
}

/// HTTP-interface backend capability
pub trait HttpColumnarClient: Send + Sync + 'static {
    /// Run a query; the body is the backend's `JSONEachRow` output
    fn query_ndjson<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<Bytes>>;

    /// Stream `rows` (NDJSON) into `statement`
    fn insert_ndjson<'a>(&'a self, statement: &'a str, rows: Bytes) -> BoxFuture<'a, BackendResult<()>>;

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    sql: String,
    /// Return backend NDJSON untouched (HTTP variant)
    #[serde(default)]
    raw: bool,
}

impl QueryRequest {
    fn decode(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self {
            sql: String::from_utf8_lossy(body).into_owned(),
            raw: false,
        })
    }
}
