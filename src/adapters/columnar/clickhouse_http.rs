//! ClickHouse HTTP interface client

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::{RequestBuilder, Response};
use tracing::info;

use super::HttpColumnarClient;
use crate::adapters::{BackendError, BackendResult};
use crate::bootstrap::Connector;

/// Builds the HTTP client during bootstrap
pub struct HttpClickHouseConnector {
    base_url: String,
    user: String,
    password: String,
    database: String,
    request_timeout: Duration,
}

impl HttpClickHouseConnector {
    pub fn new(
        base_url: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            request_timeout,
        }
    }
}

impl Connector for HttpClickHouseConnector {
    type Handle = HttpClickHouse;

    fn backend(&self) -> &str {
        &self.base_url
    }

    fn connect(&self) -> BoxFuture<'_, BackendResult<HttpClickHouse>> {
        Box::pin(async move {
            let http = reqwest::Client::builder()
                .timeout(self.request_timeout)
                .build()?;
            Ok(HttpClickHouse {
                http,
                base_url: self.base_url.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                database: self.database.clone(),
            })
        })
    }

    fn probe<'a>(&'a self, handle: &'a HttpClickHouse) -> BoxFuture<'a, BackendResult<()>> {
        handle.ping()
    }

    fn discard(&self, _handle: HttpClickHouse) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// ClickHouse over HTTP
pub struct HttpClickHouse {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
}

impl HttpClickHouse {
    fn post(&self) -> RequestBuilder {
        self.http
            .post(&self.base_url)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .header("X-ClickHouse-Database", &self.database)
    }
}

/// Body of a 2xx response; anything else becomes the server's error text
async fn success_body(resp: Response) -> BackendResult<Bytes> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.bytes().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(BackendError::Driver(format!(
        "HTTP {}: {}",
        status.as_u16(),
        text.trim()
    )))
}

impl HttpColumnarClient for HttpClickHouse {
    fn query_ndjson<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<Bytes>> {
        Box::pin(async move {
            let resp = self
                .post()
                .query(&[("default_format", "JSONEachRow")])
                .body(sql.to_string())
                .send()
                .await?;
            success_body(resp).await
        })
    }

    fn insert_ndjson<'a>(&'a self, statement: &'a str, rows: Bytes) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let query = format!("{} FORMAT JSONEachRow", statement);
            let resp = self
                .post()
                .query(&[("query", query.as_str())])
                .body(rows)
                .send()
                .await?;
            success_body(resp).await?;
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            let resp = self.http.get(format!("{}/ping", self.base_url)).send().await?;
            success_body(resp).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { info!("clickhouse http client released") })
    }
}
