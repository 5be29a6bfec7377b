//! Backend kinds served by the sidecar

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The backend a sidecar process is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relational store (PostgreSQL)
    Sql,
    /// Key-value store (Valkey/Redis)
    Kv,
    /// Columnar analytics store (ClickHouse)
    Datastore,
    /// Document store (MongoDB/FerretDB)
    DocumentDb,
}

impl BackendKind {
    /// All kinds, in message-type order
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Sql,
        BackendKind::Kv,
        BackendKind::Datastore,
        BackendKind::DocumentDb,
    ];

    /// Envelope message-type tag registered for this kind
    pub fn message_type(&self) -> u16 {
        match self {
            Self::Sql => 300,
            Self::Kv => 301,
            Self::Datastore => 302,
            Self::DocumentDb => 303,
        }
    }

    /// Mode name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Kv => "kv",
            Self::Datastore => "datastore",
            Self::DocumentDb => "documentdb",
        }
    }

    /// Service name reported by health checks
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Sql => "zap-sql",
            Self::Kv => "zap-kv",
            Self::Datastore => "zap-datastore",
            Self::DocumentDb => "zap-documentdb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" | "relational" | "postgres" => Ok(Self::Sql),
            "kv" | "valkey" | "redis" => Ok(Self::Kv),
            "datastore" | "columnar" | "clickhouse" => Ok(Self::Datastore),
            "documentdb" | "document" | "mongo" | "ferretdb" => Ok(Self::DocumentDb),
            other => Err(format!(
                "unknown mode '{}', use: sql, kv, datastore, or documentdb",
                other
            )),
        }
    }
}
