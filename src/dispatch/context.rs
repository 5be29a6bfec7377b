//! Request Context
//!
//! Fresh per call; carries the request id and deadline through an adapter
//! operation.

use std::time::{Duration, Instant};

use uuid::Uuid;

/// Context handed to every adapter operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing
    request_id: Uuid,

    /// Route that was resolved for this request
    route: &'static str,

    /// Time budget for the operation
    timeout: Duration,

    /// Start time for duration tracking
    started_at: Instant,
}

impl RequestContext {
    /// Create a new context for `route` with the given time budget
    pub fn new(route: &'static str, timeout: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            route,
            timeout,
            started_at: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn route(&self) -> &'static str {
        self.route
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant at which the operation must be abandoned
    pub fn deadline(&self) -> Instant {
        self.started_at + self.timeout
    }

    /// Budget left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_get_distinct_ids() {
        let a = RequestContext::new("/get", Duration::from_secs(1));
        let b = RequestContext::new("/get", Duration::from_secs(1));
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_remaining_never_exceeds_timeout() {
        let ctx = RequestContext::new("/query", Duration::from_secs(30));
        assert!(ctx.remaining() <= Duration::from_secs(30));
        assert_eq!(ctx.route(), "/query");
    }
}
