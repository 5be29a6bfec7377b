//! Observability
//!
//! Structured logging through `tracing`. One event per line, either compact
//! text or JSON lines.

mod logging;

pub use logging::{init_logging, LogFormat, LoggingError};
