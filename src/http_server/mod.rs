//! # Health HTTP endpoint
//!
//! Optional plain-HTTP surface for orchestrator probes. It forwards to the
//! same bridge the transport uses, so `/health` reflects a real backend
//! round trip.
//!
//! # Endpoints
//!
//! - `GET /health` - backend health probe
//! - `GET /tools` - tool catalogue

mod config;
mod server;

pub use config::HealthServerConfig;
pub use server::{HealthServer, HealthServerHandle};
