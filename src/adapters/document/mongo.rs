//! MongoDB / FerretDB client

use futures_util::future::BoxFuture;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde_json::{Map, Value};
use tracing::info;

use super::{DocumentClient, UpdateCounts};
use crate::adapters::{BackendError, BackendResult};
use crate::bootstrap::Connector;

/// Connects and pings during bootstrap
pub struct MongoConnector {
    uri: String,
    label: String,
    user: Option<String>,
    password: Option<String>,
}

impl MongoConnector {
    /// `uri` is a `mongodb://` connection string
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            label: describe(uri),
            user: None,
            password: None,
        }
    }

    /// Credentials that replace any user info in the connection string
    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }
}

/// Merge explicit credentials into parsed options. Auth source and
/// mechanism from the connection string are kept.
fn apply_credentials(
    options: &mut ClientOptions,
    user: Option<&str>,
    password: Option<&str>,
) -> BackendResult<()> {
    if user.is_none() && password.is_none() {
        return Ok(());
    }

    let mut credential = options.credential.take().unwrap_or_default();
    if let Some(user) = user {
        credential.username = Some(user.to_string());
    }
    if let Some(password) = password {
        credential.password = Some(password.to_string());
    }
    if credential.username.is_none() {
        return Err(BackendError::Config(
            "a password was given without a user".to_string(),
        ));
    }
    options.credential = Some(credential);
    Ok(())
}

/// Connection string without credentials
fn describe(uri: &str) -> String {
    let (scheme, rest) = uri.split_once("://").unwrap_or(("mongodb", uri));
    let hosts = rest.rsplit_once('@').map_or(rest, |(_, hosts)| hosts);
    let hosts = hosts.split(['/', '?']).next().unwrap_or_default();
    format!("{} at {}", scheme, hosts)
}

impl Connector for MongoConnector {
    type Handle = MongoClient;

    fn backend(&self) -> &str {
        &self.label
    }

    fn connect(&self) -> BoxFuture<'_, BackendResult<MongoClient>> {
        Box::pin(async move {
            let mut options = ClientOptions::parse(self.uri.as_str()).await?;
            apply_credentials(&mut options, self.user.as_deref(), self.password.as_deref())?;
            let client = Client::with_options(options)?;
            Ok(MongoClient { client })
        })
    }

    fn probe<'a>(&'a self, handle: &'a MongoClient) -> BoxFuture<'a, BackendResult<()>> {
        handle.ping()
    }

    fn discard(&self, handle: MongoClient) -> BoxFuture<'_, ()> {
        Box::pin(async move { handle.client.shutdown().await })
    }
}

/// Shared MongoDB client; clones share one connection pool
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }
}

/// Extended JSON object -> BSON document
fn to_document(map: Map<String, Value>) -> BackendResult<Document> {
    match Bson::try_from(Value::Object(map)) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(BackendError::value(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(BackendError::value(format!("invalid extended JSON: {}", e))),
    }
}

impl DocumentClient for MongoClient {
    fn find<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Map<String, Value>,
        limit: Option<i64>,
    ) -> BoxFuture<'a, BackendResult<Vec<Value>>> {
        Box::pin(async move {
            let filter = to_document(filter)?;
            let coll = self.collection(database, collection);
            let mut find = coll.find(filter);
            if let Some(limit) = limit {
                find = find.limit(limit);
            }
            let docs: Vec<Document> = find.await?.try_collect().await?;
            Ok(docs
                .into_iter()
                .map(|d| Bson::Document(d).into_relaxed_extjson())
                .collect())
        })
    }

    fn insert_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        documents: Vec<Map<String, Value>>,
    ) -> BoxFuture<'a, BackendResult<Vec<Value>>> {
        Box::pin(async move {
            let docs = documents
                .into_iter()
                .map(to_document)
                .collect::<BackendResult<Vec<_>>>()?;
            let count = docs.len();
            let result = self.collection(database, collection).insert_many(docs).await?;

            let mut ids = result.inserted_ids;
            Ok((0..count)
                .map(|i| ids.remove(&i).map_or(Value::Null, Bson::into_relaxed_extjson))
                .collect())
        })
    }

    fn update_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Map<String, Value>,
        update: Map<String, Value>,
    ) -> BoxFuture<'a, BackendResult<UpdateCounts>> {
        Box::pin(async move {
            let filter = to_document(filter)?;
            let update = to_document(update)?;
            let result = self
                .collection(database, collection)
                .update_many(filter, update)
                .await?;
            Ok(UpdateCounts {
                matched: result.matched_count,
                modified: result.modified_count,
            })
        })
    }

    fn delete_many<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: Map<String, Value>,
    ) -> BoxFuture<'a, BackendResult<u64>> {
        Box::pin(async move {
            let filter = to_document(filter)?;
            let result = self.collection(database, collection).delete_many(filter).await?;
            Ok(result.deleted_count)
        })
    }

    fn list_collections<'a>(&'a self, database: &'a str) -> BoxFuture<'a, BackendResult<Vec<String>>> {
        Box::pin(async move {
            let mut names = self.client.database(database).list_collection_names().await?;
            names.sort();
            Ok(names)
        })
    }

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            self.client.database("admin").run_command(doc! { "ping": 1 }).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.client.clone().shutdown().await;
            info!("document store client shut down");
        })
    }
}
