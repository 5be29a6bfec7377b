//! Document adapter
//!
//! `/find`, `/insert`, `/update`, `/delete` and `/health` against a
//! MongoDB-compatible store. Filters, updates and documents are extended JSON.
//! There is no default operation, so an unknown path is always a 404.

mod mongo;

pub use mongo::{MongoClient, MongoConnector};

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapters::{BackendError, BackendResult};
use crate::dispatch::{Adapter, BridgeError, OperationResult, Reply, RequestContext, RouteTable};
use crate::kind::BackendKind;

/// Database used when none is configured
pub const DEFAULT_DATABASE: &str = "zap";

type Document = Map<String, Value>;

/// Counts reported by an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Document backend capability
pub trait DocumentClient: Send + Sync + 'static {
    /// Documents matching `filter`, at most `limit` when given
    fn find<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Document,
        limit: Option<i64>,
    ) -> BoxFuture<'a, BackendResult<Vec<Value>>>;

    /// Insert `documents`; returns their ids in input order
    fn insert_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, BackendResult<Vec<Value>>>;

    fn update_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, BackendResult<UpdateCounts>>;

    fn delete_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, BackendResult<u64>>;

    /// Collection names in `database`, sorted
    fn list_collections<'a>(&'a self, database: &'a str) -> BoxFuture<'a, BackendResult<Vec<String>>>;

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Deserialize)]
struct FindRequest {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    filter: Option<Document>,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    database: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsertRequest {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    database: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    filter: Option<Document>,
    update: Document,
    #[serde(default)]
    database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionsRequest {
    #[serde(default)]
    database: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    filter: Option<Document>,
    #[serde(default)]
    database: Option<String>,
}

fn require_collection(collection: &str) -> Result<(), BridgeError> {
    if collection.trim().is_empty() {
        return Err(BridgeError::invalid_request("collection is required"));
    }
    Ok(())
}

/// Unconvertible extended JSON is the caller's fault
fn driver_error(err: BackendError) -> BridgeError {
    match err {
        BackendError::Value(msg) => BridgeError::invalid_request(msg),
        other => BridgeError::backend(other),
    }
}

/// Document bridge adapter
pub struct DocumentAdapter<C> {
    client: C,
    database: String,
}

impl<C: DocumentClient> DocumentAdapter<C> {
    pub fn new(client: C, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    fn database<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        match requested.as_deref() {
            Some(db) if !db.is_empty() => db,
            _ => &self.database,
        }
    }

    fn find(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: FindRequest = serde_json::from_slice(&body)?;
            require_collection(&req.collection)?;
            let limit = (req.limit > 0).then_some(req.limit);

            let documents = self
                .client
                .find(
                    self.database(&req.database),
                    &req.collection,
                    req.filter.unwrap_or_default(),
                    limit,
                )
                .await
                .map_err(driver_error)?;
            Ok(Reply::ok(&json!({
                "count": documents.len(),
                "documents": documents,
            })))
        })
    }

    fn insert(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: InsertRequest = serde_json::from_slice(&body)?;
            require_collection(&req.collection)?;
            if req.documents.is_empty() {
                return Err(BridgeError::invalid_request("no documents"));
            }

            let ids = self
                .client
                .insert_many(self.database(&req.database), &req.collection, req.documents)
                .await
                .map_err(driver_error)?;
            Ok(Reply::ok(&json!({
                "count": ids.len(),
                "inserted_ids": ids,
            })))
        })
    }

    fn update(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: UpdateRequest = serde_json::from_slice(&body)?;
            require_collection(&req.collection)?;

            let counts = self
                .client
                .update_many(
                    self.database(&req.database),
                    &req.collection,
                    req.filter.unwrap_or_default(),
                    req.update,
                )
                .await
                .map_err(driver_error)?;
            Ok(Reply::ok(&json!({
                "matched_count": counts.matched,
                "modified_count": counts.modified,
            })))
        })
    }

    fn delete(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: DeleteRequest = serde_json::from_slice(&body)?;
            require_collection(&req.collection)?;

            let deleted = self
                .client
                .delete_many(
                    self.database(&req.database),
                    &req.collection,
                    req.filter.unwrap_or_default(),
                )
                .await
                .map_err(driver_error)?;
            Ok(Reply::ok(&json!({ "deleted_count": deleted })))
        })
    }

    fn collections(&self, _ctx: RequestContext, body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            let req: CollectionsRequest = if body.is_empty() {
                CollectionsRequest::default()
            } else {
                serde_json::from_slice(&body)?
            };
            let database = self.database(&req.database);
            let names = self
                .client
                .list_collections(database)
                .await
                .map_err(driver_error)?;
            Ok(Reply::ok(&json!({
                "database": database,
                "count": names.len(),
                "collections": names,
            })))
        })
    }

    fn health(&self, _ctx: RequestContext, _body: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async move {
            self.client.ping().await.map_err(BridgeError::unavailable)?;
            Ok(Reply::ok(&json!({
                "status": "ok",
                "service": BackendKind::DocumentDb.service_name(),
            })))
        })
    }
}

impl<C: DocumentClient> Adapter for DocumentAdapter<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::DocumentDb
    }

    fn routes(&self) -> RouteTable<Self> {
        RouteTable::new()
            .route("/find", Self::find)
            .route("/insert", Self::insert)
            .route("/update", Self::update)
            .route("/delete", Self::delete)
            .route("/collections", Self::collections)
            .route_with_timeout("/health", Self::health, Duration::from_secs(5))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.client.close()
    }
}
