//! Backend driver errors
//!
//! Drivers report one driver-agnostic error; each adapter decides which
//! status it maps to.

use std::time::Duration;

use thiserror::Error;

/// Error raised by a backend client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Error reported by the driver or the server
    #[error("{0}")]
    Driver(String),

    /// Connect or probe exceeded its budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection parameters could not be used
    #[error("invalid connection settings: {0}")]
    Config(String),

    /// A value could not be converted for the backend
    #[error("{0}")]
    Value(String),
}

impl BackendError {
    pub fn driver(msg: impl ToString) -> Self {
        Self::Driver(msg.to_string())
    }

    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
}

/// Result type for backend clients
pub type BackendResult<T> = Result<T, BackendError>;

impl From<tokio_postgres::Error> for BackendError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) => Self::Driver(db.message().to_string()),
            None => Self::Driver(e.to_string()),
        }
    }
}

impl From<deadpool_postgres::PoolError> for BackendError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        match e {
            deadpool_postgres::PoolError::Backend(e) => e.into(),
            other => Self::Driver(other.to_string()),
        }
    }
}

impl From<deadpool_postgres::CreatePoolError> for BackendError {
    fn from(e: deadpool_postgres::CreatePoolError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<redis::RedisError> for BackendError {
    fn from(e: redis::RedisError) -> Self {
        Self::Driver(e.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Driver(e.to_string())
    }
}

impl From<klickhouse::KlickhouseError> for BackendError {
    fn from(e: klickhouse::KlickhouseError) -> Self {
        Self::Driver(e.to_string())
    }
}

impl From<deadpool::managed::PoolError<klickhouse::KlickhouseError>> for BackendError {
    fn from(e: deadpool::managed::PoolError<klickhouse::KlickhouseError>) -> Self {
        match e {
            deadpool::managed::PoolError::Backend(e) => e.into(),
            other => Self::Driver(other.to_string()),
        }
    }
}

impl From<deadpool::managed::BuildError> for BackendError {
    fn from(e: deadpool::managed::BuildError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<mongodb::error::Error> for BackendError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::Driver(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Value(e.to_string())
    }
}
