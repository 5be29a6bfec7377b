//! Tool Catalogue
//!
//! MCP-compatible descriptions of what each bridge exposes. Tools and
//! resources are tied to the route that serves them so a bridge only
//! advertises the routes it actually registered.

use serde::Serialize;
use serde_json::{json, Value};

use crate::kind::BackendKind;

/// Route that serves the catalogue itself
pub const TOOLS_ROUTE: &str = "/tools";

/// Resource URIs are accepted as request paths
pub const RESOURCE_SCHEME: &str = "zap://";

/// A callable tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// Envelope path that implements the tool
    pub route: &'static str,
}

/// A readable resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDef {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
    /// Envelope path that returns the resource
    pub route: &'static str,
}

/// Everything a bridge advertises
#[derive(Debug, Clone, Serialize)]
pub struct Catalogue {
    pub service: &'static str,
    pub tools: Vec<ToolDef>,
    pub resources: Vec<ResourceDef>,
}

/// Catalogue for `kind`, restricted to the routes in `registered`
pub fn catalogue(kind: BackendKind, registered: &[&'static str]) -> Catalogue {
    let tools = tool_defs(kind)
        .into_iter()
        .filter(|tool| registered.contains(&tool.route))
        .collect();

    let resources = resource_defs(kind)
        .into_iter()
        .filter(|resource| registered.contains(&resource.route))
        .collect();

    Catalogue {
        service: kind.service_name(),
        tools,
        resources,
    }
}

fn tool(
    kind: BackendKind,
    route: &'static str,
    description: &'static str,
    input_schema: Value,
) -> ToolDef {
    ToolDef {
        name: format!("{}_{}", kind.as_str(), route.trim_start_matches('/')),
        description,
        input_schema,
        route,
    }
}

fn health(kind: BackendKind, description: &'static str) -> ToolDef {
    tool(
        kind,
        "/health",
        description,
        json!({"type": "object", "properties": {}}),
    )
}

fn tool_defs(kind: BackendKind) -> Vec<ToolDef> {
    match kind {
        BackendKind::Sql => vec![
            tool(
                kind,
                "/query",
                "Execute a read-only SQL query and return results as JSON rows",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "SQL SELECT query"},
                        "args": {"type": "array", "description": "Query parameters"}
                    },
                    "required": ["sql"]
                }),
            ),
            tool(
                kind,
                "/exec",
                "Execute a write SQL statement (INSERT, UPDATE, DELETE) and return affected row count",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "SQL statement"},
                        "args": {"type": "array", "description": "Statement parameters"}
                    },
                    "required": ["sql"]
                }),
            ),
            health(kind, "Check PostgreSQL connection health"),
        ],
        BackendKind::Kv => vec![
            tool(
                kind,
                "/get",
                "Get a value by key",
                json!({
                    "type": "object",
                    "properties": {
                        "key": {"type": "string", "description": "Key to retrieve"}
                    },
                    "required": ["key"]
                }),
            ),
            tool(
                kind,
                "/set",
                "Set a key-value pair",
                json!({
                    "type": "object",
                    "properties": {
                        "key": {"type": "string", "description": "Key to set"},
                        "value": {"type": "string", "description": "Value to set"},
                        "ttl": {"type": "integer", "description": "TTL in seconds (0 = no expiry)"}
                    },
                    "required": ["key", "value"]
                }),
            ),
            tool(
                kind,
                "/mget",
                "Get multiple values by keys",
                json!({
                    "type": "object",
                    "properties": {
                        "keys": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["keys"]
                }),
            ),
            tool(
                kind,
                "/cmd",
                "Execute an arbitrary Valkey/Redis command",
                json!({
                    "type": "object",
                    "properties": {
                        "cmd": {"type": "string", "description": "Command name (e.g. HGET, LPUSH)"},
                        "args": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["cmd"]
                }),
            ),
            health(kind, "Check Valkey/Redis connection health"),
        ],
        BackendKind::Datastore => vec![
            tool(
                kind,
                "/query",
                "Execute a ClickHouse SQL query and return results as JSON rows",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "ClickHouse SQL query"}
                    },
                    "required": ["sql"]
                }),
            ),
            tool(
                kind,
                "/exec",
                "Execute a DDL or non-SELECT ClickHouse statement (CREATE, ALTER, DROP, etc.)",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "SQL statement"},
                        "args": {"type": "array", "description": "Statement parameters"}
                    },
                    "required": ["sql"]
                }),
            ),
            tool(
                kind,
                "/insert",
                "Bulk insert rows into a ClickHouse table in one batch",
                json!({
                    "type": "object",
                    "properties": {
                        "table": {"type": "string", "description": "Target table name"},
                        "database": {"type": "string", "description": "Database name"},
                        "columns": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Column names (inferred from rows if omitted)"
                        },
                        "rows": {"type": "array", "description": "Array of row objects to insert"}
                    },
                    "required": ["table", "rows"]
                }),
            ),
            tool(
                kind,
                "/tables",
                "List tables and their metadata in a ClickHouse database",
                json!({
                    "type": "object",
                    "properties": {
                        "database": {"type": "string", "description": "Database name (default: configured database)"}
                    }
                }),
            ),
            health(kind, "Check ClickHouse connection health and server version"),
        ],
        BackendKind::DocumentDb => vec![
            tool(
                kind,
                "/find",
                "Find documents in a collection matching a filter",
                json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string", "description": "Collection name"},
                        "filter": {"type": "object", "description": "MongoDB query filter"},
                        "limit": {"type": "integer", "description": "Max documents to return"},
                        "database": {"type": "string", "description": "Database name (default: configured database)"}
                    },
                    "required": ["collection"]
                }),
            ),
            tool(
                kind,
                "/insert",
                "Insert documents into a collection",
                json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string", "description": "Collection name"},
                        "documents": {"type": "array", "description": "Array of documents to insert"},
                        "database": {"type": "string", "description": "Database name"}
                    },
                    "required": ["collection", "documents"]
                }),
            ),
            tool(
                kind,
                "/update",
                "Update documents matching a filter",
                json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string", "description": "Collection name"},
                        "filter": {"type": "object", "description": "Match filter"},
                        "update": {"type": "object", "description": "Update operations"},
                        "database": {"type": "string", "description": "Database name"}
                    },
                    "required": ["collection", "filter", "update"]
                }),
            ),
            tool(
                kind,
                "/delete",
                "Delete documents matching a filter",
                json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string", "description": "Collection name"},
                        "filter": {"type": "object", "description": "Match filter"},
                        "database": {"type": "string", "description": "Database name"}
                    },
                    "required": ["collection", "filter"]
                }),
            ),
            health(kind, "Check DocumentDB/FerretDB connection health"),
        ],
    }
}

fn resource_defs(kind: BackendKind) -> Vec<ResourceDef> {
    let resource = match kind {
        BackendKind::Sql => ResourceDef {
            uri: "zap://sql/schema",
            name: "Database Schema",
            description: "PostgreSQL tables and their columns",
            mime_type: "application/json",
            route: "/schema",
        },
        BackendKind::Kv => ResourceDef {
            uri: "zap://kv/info",
            name: "KV Server Info",
            description: "Valkey/Redis server info and statistics",
            mime_type: "application/json",
            route: "/info",
        },
        BackendKind::Datastore => ResourceDef {
            uri: "zap://datastore/tables",
            name: "Datastore Tables",
            description: "ClickHouse table definitions and schemas",
            mime_type: "application/json",
            route: "/tables",
        },
        BackendKind::DocumentDb => ResourceDef {
            uri: "zap://documentdb/collections",
            name: "DocumentDB Collections",
            description: "Collections in the configured database",
            mime_type: "application/json",
            route: "/collections",
        },
    };
    vec![resource]
}

/// Route serving the resource at `uri`
pub fn resource_route(kind: BackendKind, uri: &str) -> Option<&'static str> {
    resource_defs(kind)
        .into_iter()
        .find(|resource| resource.uri == uri)
        .map(|resource| resource.route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_follow_mode_and_route() {
        let cat = catalogue(BackendKind::Kv, &["/get", "/set", "/mget", "/cmd", "/health"]);
        let names: Vec<_> = cat.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["kv_get", "kv_set", "kv_mget", "kv_cmd", "kv_health"]);
        assert_eq!(cat.service, "zap-kv");
    }

    #[test]
    fn test_unregistered_routes_are_not_advertised() {
        // HTTP columnar variant has no /exec or /tables
        let cat = catalogue(BackendKind::Datastore, &["/health", "/insert", "/query"]);
        let routes: Vec<_> = cat.tools.iter().map(|t| t.route).collect();
        assert_eq!(routes, vec!["/query", "/insert", "/health"]);
        assert!(cat.resources.is_empty());

        let cat = catalogue(BackendKind::Datastore, &["/health", "/tables"]);
        assert_eq!(cat.resources[0].uri, "zap://datastore/tables");
    }

    #[test]
    fn test_every_resource_names_its_route() {
        for kind in [
            BackendKind::Sql,
            BackendKind::Kv,
            BackendKind::Datastore,
            BackendKind::DocumentDb,
        ] {
            for resource in resource_defs(kind) {
                assert_eq!(resource_route(kind, resource.uri), Some(resource.route));
            }
        }
        assert_eq!(resource_route(BackendKind::Kv, "zap://sql/schema"), None);
    }

    #[test]
    fn test_serialized_shape_is_mcp_compatible() {
        let cat = catalogue(BackendKind::Sql, &["/query", "/schema"]);
        let value = serde_json::to_value(&cat).unwrap();
        assert_eq!(value["tools"][0]["name"], "sql_query");
        assert_eq!(value["tools"][0]["inputSchema"]["required"], json!(["sql"]));
        assert_eq!(value["resources"][0]["mimeType"], "application/json");
        assert_eq!(value["resources"][0]["route"], "/schema");
    }
}
