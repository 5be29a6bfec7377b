//! Connection bootstrap
//!
//! Establishes a backend connection with bounded retry before the bridge
//! accepts traffic. A handle that connects but fails its probe is released
//! before the next attempt.

use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::{BackendError, BackendResult};

/// Fixed-interval retry policy for bootstrap
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
    /// Budget for one connect and one probe
    pub probe_timeout: Duration,
}

impl RetryPolicy {
    /// Creates a fixed-interval policy (no backoff).
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(2))
    }
}

/// Connection factory, liveness probe and release for one backend
pub trait Connector: Send + Sync {
    type Handle: Send;

    /// Backend description for logs
    fn backend(&self) -> &str;

    fn connect(&self) -> BoxFuture<'_, BackendResult<Self::Handle>>;

    fn probe<'a>(&'a self, handle: &'a Self::Handle) -> BoxFuture<'a, BackendResult<()>>;

    /// Release a handle that will not be used
    fn discard(&self, handle: Self::Handle) -> BoxFuture<'_, ()>;
}

/// Bootstrap failure
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{backend} not reachable after {attempts} attempts: {last_error}")]
    Exhausted {
        backend: String,
        attempts: u32,
        last_error: BackendError,
    },
}

/// Connect and probe until success or `policy.max_attempts` is reached
pub async fn connect_with_retry<C: Connector>(
    policy: &RetryPolicy,
    connector: &C,
) -> Result<C::Handle, BootstrapError> {
    let mut last_error = BackendError::Config("no connection attempts configured".to_string());

    for attempt in 1..=policy.max_attempts {
        match attempt_once(policy, connector).await {
            Ok(handle) => {
                info!(backend = connector.backend(), attempt, "backend ready");
                return Ok(handle);
            }
            Err(e) => {
                warn!(
                    backend = connector.backend(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "backend not ready"
                );
                last_error = e;
            }
        }

        if attempt < policy.max_attempts && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(BootstrapError::Exhausted {
        backend: connector.backend().to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

async fn attempt_once<C: Connector>(policy: &RetryPolicy, connector: &C) -> BackendResult<C::Handle> {
    let handle = tokio::time::timeout(policy.probe_timeout, connector.connect())
        .await
        .map_err(|_| BackendError::Timeout(policy.probe_timeout))??;

    match tokio::time::timeout(policy.probe_timeout, connector.probe(&handle)).await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            connector.discard(handle).await;
            Err(e)
        }
        Err(_) => {
            connector.discard(handle).await;
            Err(BackendError::Timeout(policy.probe_timeout))
        }
    }
}
