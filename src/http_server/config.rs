//! Health endpoint configuration

use serde::{Deserialize, Serialize};

/// Health endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl HealthServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
