//! zap-sidecar - a ZAP protocol bridge to a single backend
//!
//! Requests arrive as binary envelopes over a persistent TCP transport, are
//! routed by path to one backend adapter (relational, key-value, columnar or
//! document) and answered with a response envelope carrying a status, a JSON
//! body and a header map.

pub mod adapters;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod http_server;
pub mod kind;
pub mod observability;
pub mod tools;
pub mod transport;
