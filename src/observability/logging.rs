//! Logging setup, powered by tracing-subscriber

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Driver crates that are chatty at info/debug
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("tokio_postgres", "warn"),
    ("deadpool", "warn"),
    ("redis", "warn"),
    ("klickhouse", "warn"),
    ("mongodb", "warn"),
    ("reqwest", "warn"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `timestamp LEVEL target: message fields`
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" | "pretty" => Ok(Self::Compact),
            "json" | "jsonl" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}' (expected compact or json)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => f.write_str("compact"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Base level plus the noisy-target caps
fn directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }
    directives.join(",")
}

/// `RUST_LOG`, when set, replaces the configured level entirely
fn build_env_filter(level: &str, rust_log: Option<String>) -> Result<EnvFilter, LoggingError> {
    let filter = match rust_log {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ => directives(level),
    };
    EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
        filter,
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_env_filter(level, std::env::var("RUST_LOG").ok())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
