//! CLI-specific error types
//!
//! All CLI errors are fatal: `main` prints them and exits 1.

use std::fmt;
use std::io;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::observability::LoggingError;
use crate::transport::TransportError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Invalid flags or environment
    ConfigError,
    /// I/O error (stdin/stdout, runtime)
    IoError,
    /// Backend never became reachable
    BootFailed,
    /// Transport or health listener could not bind
    ListenFailed,
    /// `call` could not complete
    CallFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "ZAP_CLI_CONFIG_ERROR",
            Self::IoError => "ZAP_CLI_IO_ERROR",
            Self::BootFailed => "ZAP_CLI_BOOT_FAILED",
            Self::ListenFailed => "ZAP_CLI_LISTEN_FAILED",
            Self::CallFailed => "ZAP_CLI_CALL_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Boot failed
    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Listener failed
    pub fn listen_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ListenFailed, msg)
    }

    /// Call failed
    pub fn call_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::CallFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<BootstrapError> for CliError {
    fn from(e: BootstrapError) -> Self {
        Self::boot_failed(e.to_string())
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        Self::call_failed(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
