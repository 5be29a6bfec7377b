//! Sidecar configuration
//!
//! Built from the `serve` flags (or their `ZAP_*` environment fallbacks) and
//! validated once before any connection is attempted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::BackendKind;
use crate::transport::NodeConfig;

/// Default transport port
pub const DEFAULT_PORT: u16 = 9651;

/// Default discovery service type
pub const DEFAULT_SERVICE_TYPE: &str = "_zap._tcp";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("--mode is required (sql, kv, datastore, or documentdb)")]
    MissingMode,

    #[error("--backend is required for mode {0}")]
    MissingBackend(BackendKind),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything `serve` needs to start one bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    pub mode: BackendKind,

    /// Node id advertised by the transport (default: the mode name)
    #[serde(default)]
    pub node_id: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Backend address: DSN, `host:port` or URL depending on mode
    pub backend: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    /// Default per-operation budget
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Port of the plain-HTTP health endpoint; `None` disables it
    #[serde(default)]
    pub health_port: Option<u16>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl SidecarConfig {
    pub fn new(mode: BackendKind, backend: impl Into<String>) -> Self {
        Self {
            mode,
            node_id: None,
            port: DEFAULT_PORT,
            service_type: default_service_type(),
            backend: backend.into(),
            user: None,
            password: None,
            database: None,
            request_timeout_secs: default_request_timeout_secs(),
            health_port: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::MissingBackend(self.mode));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request timeout",
                reason: "must be > 0".into(),
            });
        }
        if self.service_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "service type",
                reason: "must not be empty".into(),
            });
        }
        if self.mode == BackendKind::Kv {
            self.kv_database()?;
        }
        if let Some(health) = self.health_port {
            if health == self.port && health != 0 {
                return Err(ConfigError::Invalid {
                    field: "health port",
                    reason: format!("{} is already the transport port", health),
                });
            }
        }
        Ok(())
    }

    pub fn node_id(&self) -> String {
        self.node_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.mode.as_str().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new(self.node_id(), self.port);
        config.service_type = self.service_type.clone();
        config
    }

    /// Configured database, or the mode's default
    pub fn database_or(&self, default: &str) -> String {
        self.database
            .clone()
            .filter(|db| !db.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    /// Key-value database index, when one is configured
    pub fn kv_database(&self) -> Result<Option<i64>, ConfigError> {
        match self.database.as_deref().filter(|db| !db.is_empty()) {
            None => Ok(None),
            Some(db) => db.parse().map(Some).map_err(|_| ConfigError::Invalid {
                field: "database",
                reason: format!("key-value database must be a number, got '{}'", db),
            }),
        }
    }

    /// The datastore backend is reached over HTTP when given an http(s) URL
    pub fn datastore_over_http(&self) -> bool {
        let backend = self.backend.trim_start();
        backend.starts_with("http://") || backend.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SidecarConfig::new(BackendKind::Sql, "postgres://localhost/app");
        assert_eq!(config.port, 9651);
        assert_eq!(config.service_type, "_zap._tcp");
        assert_eq!(config.node_id(), "sql");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_backend() {
        let config = SidecarConfig::new(BackendKind::Kv, "  ");
        assert_eq!(config.validate(), Err(ConfigError::MissingBackend(BackendKind::Kv)));
    }

    #[test]
    fn test_kv_database_must_be_numeric() {
        let mut config = SidecarConfig::new(BackendKind::Kv, "localhost:6379");
        config.database = Some("2".into());
        assert_eq!(config.kv_database(), Ok(Some(2)));

        config.database = Some("cache".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "database", .. })));
    }

    #[test]
    fn test_health_port_must_differ() {
        let mut config = SidecarConfig::new(BackendKind::Sql, "postgres://localhost/app");
        config.health_port = Some(9651);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_datastore_transport_selection() {
        let native = SidecarConfig::new(BackendKind::Datastore, "clickhouse:9000");
        let http = SidecarConfig::new(BackendKind::Datastore, "http://clickhouse:8123");
        assert!(!native.datastore_over_http());
        assert!(http.datastore_over_http());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SidecarConfig =
            serde_json::from_str(r#"{"mode": "documentdb", "backend": "mongodb://db:27017"}"#).unwrap();
        assert_eq!(config.mode, BackendKind::DocumentDb);
        assert_eq!(config.port, 9651);
        assert_eq!(config.database_or("zap"), "zap");
        assert_eq!(config.node_id(), "documentdb");
    }
}
