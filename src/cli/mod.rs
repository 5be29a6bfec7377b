//! CLI module for zap-sidecar
//!
//! Provides command-line interface for:
//! - serve: bootstrap one backend and bridge ZAP traffic to it
//! - call: one-shot request against a running sidecar

mod args;
mod commands;
mod errors;
mod io;

pub use args::{CallArgs, Cli, Command, ServeArgs};
pub use commands::{call, connect_bridge, run, run_bridge, run_command, serve, shutdown_signal};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_body, render_reply, write_reply};
