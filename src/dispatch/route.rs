//! Route Table
//!
//! Maps route strings to adapter operations. Built once per dispatcher;
//! lookups are exact string matches.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::context::RequestContext;
use super::errors::BridgeResult;
use super::response::Reply;

/// Result of an operation
pub type OperationResult = BridgeResult<Reply>;

/// An adapter operation: borrows the adapter for the life of the call
pub type Operation<A> = for<'a> fn(&'a A, RequestContext, Bytes) -> BoxFuture<'a, OperationResult>;

/// A registered operation with its optional time budget override
pub struct Route<A> {
    op: Operation<A>,
    timeout: Option<Duration>,
}

impl<A> Route<A> {
    pub fn operation(&self) -> Operation<A> {
        self.op
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Route string -> operation
pub struct RouteTable<A> {
    routes: HashMap<&'static str, Route<A>>,
    /// Route used when the path is unknown but a body is present
    fallback: Option<&'static str>,
}

impl<A> RouteTable<A> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: None,
        }
    }

    /// Register `op` under `path` with the dispatcher's default timeout
    pub fn route(mut self, path: &'static str, op: Operation<A>) -> Self {
        self.routes.insert(path, Route { op, timeout: None });
        self
    }

    /// Register `op` under `path` with its own timeout
    pub fn route_with_timeout(
        mut self,
        path: &'static str,
        op: Operation<A>,
        timeout: Duration,
    ) -> Self {
        self.routes.insert(
            path,
            Route {
                op,
                timeout: Some(timeout),
            },
        );
        self
    }

    /// Use the already registered `path` as the default operation
    pub fn fallback(mut self, path: &'static str) -> Self {
        debug_assert!(self.routes.contains_key(path), "fallback must be registered");
        self.fallback = Some(path);
        self
    }

    /// Resolve a request path.
    ///
    /// Exact match first; otherwise the fallback route when the body is
    /// non-empty. Returns the resolved route name alongside the route.
    pub fn resolve(&self, path: &str, has_body: bool) -> Option<(&'static str, &Route<A>)> {
        if let Some((name, route)) = self.routes.get_key_value(path) {
            return Some((*name, route));
        }
        if !has_body {
            return None;
        }
        let name = self.fallback?;
        self.routes.get(name).map(|route| (name, route))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn fallback_route(&self) -> Option<&'static str> {
        self.fallback
    }

    /// Registered routes, sorted
    pub fn paths(&self) -> Vec<&'static str> {
        let mut paths: Vec<_> = self.routes.keys().copied().collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<A> Default for RouteTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    fn first(_: &Echo, _: RequestContext, _: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async { Ok(Reply::ok("first")) })
    }

    fn second(_: &Echo, _: RequestContext, _: Bytes) -> BoxFuture<'_, OperationResult> {
        Box::pin(async { Ok(Reply::ok("second")) })
    }

    fn table() -> RouteTable<Echo> {
        RouteTable::new()
            .route("/first", first)
            .route_with_timeout("/second", second, Duration::from_secs(5))
            .fallback("/first")
    }

    #[test]
    fn test_exact_match() {
        let table = table();
        let (name, route) = table.resolve("/second", false).unwrap();
        assert_eq!(name, "/second");
        assert_eq!(route.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_no_prefix_matching() {
        let table = table();
        assert!(table.resolve("/second/extra", false).is_none());
        assert!(table.resolve("/SECOND", false).is_none());
    }

    #[test]
    fn test_unknown_path_with_body_uses_fallback() {
        let table = table();
        let (name, _) = table.resolve("", true).unwrap();
        assert_eq!(name, "/first");
    }

    #[test]
    fn test_unknown_path_without_body_is_unresolved() {
        assert!(table().resolve("/missing", false).is_none());
    }

    #[test]
    fn test_no_fallback_configured() {
        let table: RouteTable<Echo> = RouteTable::new().route("/first", first);
        assert!(table.resolve("/other", true).is_none());
        assert_eq!(table.paths(), vec!["/first"]);
    }
}
