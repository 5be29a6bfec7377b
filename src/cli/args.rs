//! CLI argument definitions using clap
//!
//! Commands:
//! - zap-sidecar serve --mode <mode> --backend <addr>
//! - zap-sidecar call --mode <mode> --path <path> [--body <json>]
//!
//! Every `serve` flag falls back to a `ZAP_*` environment variable.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, SidecarConfig, DEFAULT_PORT, DEFAULT_SERVICE_TYPE};
use crate::kind::BackendKind;
use crate::observability::LogFormat;

/// ZAP protocol bridge to a single backend
#[derive(Parser, Debug)]
#[command(name = "zap-sidecar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge ZAP traffic to a backend until interrupted
    Serve(ServeArgs),

    /// Send one request to a running sidecar and print the reply
    Call(CallArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Backend mode: sql, kv, datastore or documentdb
    #[arg(long, env = "ZAP_MODE")]
    pub mode: Option<String>,

    /// Node id (default: the mode name)
    #[arg(long, env = "ZAP_NODE_ID")]
    pub node_id: Option<String>,

    /// Transport listen port
    #[arg(long, env = "ZAP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Discovery service type
    #[arg(long, env = "ZAP_SERVICE_TYPE", default_value = DEFAULT_SERVICE_TYPE)]
    pub service_type: String,

    /// Backend address (DSN, host:port or URL)
    #[arg(long, env = "ZAP_BACKEND")]
    pub backend: Option<String>,

    /// Backend user
    #[arg(long, env = "ZAP_USER")]
    pub user: Option<String>,

    /// Backend password
    #[arg(long, env = "ZAP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Backend database (key-value: numeric index)
    #[arg(long, env = "ZAP_DATABASE")]
    pub database: Option<String>,

    /// Default per-request budget in seconds
    #[arg(long, env = "ZAP_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Serve GET /health and /tools over plain HTTP on this port
    #[arg(long, env = "ZAP_HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Log output: compact or json
    #[arg(long, env = "ZAP_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Log level or filter directives (RUST_LOG wins when set)
    #[arg(long, env = "ZAP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServeArgs {
    pub fn to_config(&self) -> Result<SidecarConfig, ConfigError> {
        let mode = self
            .mode
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or(ConfigError::MissingMode)?
            .parse::<BackendKind>()
            .map_err(|reason| ConfigError::Invalid {
                field: "mode",
                reason,
            })?;

        let mut config = SidecarConfig::new(mode, self.backend.clone().unwrap_or_default());
        config.node_id = self.node_id.clone();
        config.port = self.port;
        config.service_type = self.service_type.clone();
        config.user = self.user.clone();
        config.password = self.password.clone();
        config.database = self.database.clone();
        config.request_timeout_secs = self.request_timeout_secs;
        config.health_port = self.health_port;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
    /// Sidecar address
    #[arg(long, default_value = "127.0.0.1:9651")]
    pub addr: String,

    /// Backend mode of the sidecar (selects the message type)
    #[arg(long)]
    pub mode: BackendKind,

    /// Request path, e.g. /query
    #[arg(long, default_value = "")]
    pub path: String,

    /// Request body; `-` reads it from stdin
    #[arg(long, default_value = "")]
    pub body: String,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CallArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["zap-sidecar", "serve"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_serve_flags() {
        let args = serve(&[
            "--mode",
            "kv",
            "--backend",
            "localhost:6379",
            "--port",
            "9700",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.log_format, LogFormat::Json);

        let config = args.to_config().unwrap();
        assert_eq!(config.mode, BackendKind::Kv);
        assert_eq!(config.port, 9700);
        assert_eq!(config.node_id(), "kv");
    }

    #[test]
    fn test_unknown_mode_is_a_config_error() {
        let args = serve(&["--mode", "graph", "--backend", "x"]);
        assert!(matches!(
            args.to_config(),
            Err(ConfigError::Invalid { field: "mode", .. })
        ));
    }

    #[test]
    fn test_call_parses_mode() {
        let cli = Cli::try_parse_from([
            "zap-sidecar",
            "call",
            "--mode",
            "sql",
            "--path",
            "/health",
        ])
        .unwrap();
        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.mode, BackendKind::Sql);
                assert_eq!(args.addr, "127.0.0.1:9651");
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}
