//! CLI command implementations
//!
//! `serve` follows one fixed lifecycle: logging, config validation, backend
//! bootstrap, transport start, optional health endpoint, wait for a signal,
//! then stop the transport and release the backend handle.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::adapters::columnar::{
    HttpClickHouseConnector, HttpColumnarAdapter, NativeClickHouseConnector,
    NativeColumnarAdapter, DEFAULT_DATABASE as COLUMNAR_DATABASE, DEFAULT_USER as COLUMNAR_USER,
};
use crate::adapters::document::{DocumentAdapter, MongoConnector, DEFAULT_DATABASE as DOCUMENT_DATABASE};
use crate::adapters::kv::{KvAdapter, RedisConnector};
use crate::adapters::relational::{PostgresConnector, RelationalAdapter};
use crate::bootstrap::{connect_with_retry, RetryPolicy};
use crate::config::SidecarConfig;
use crate::dispatch::{Bridge, BridgeHandler, Dispatcher, Reply};
use crate::envelope::encode_request;
use crate::http_server::{HealthServer, HealthServerConfig};
use crate::kind::BackendKind;
use crate::observability::init_logging;
use crate::transport::{Client, Node};

use super::args::{CallArgs, Command, ServeArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_body, write_reply};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cmd {
        Command::Serve(args) => runtime.block_on(serve(args)),
        Command::Call(args) => runtime.block_on(call(args)),
    }
}

/// Run a bridge until SIGINT or SIGTERM
pub async fn serve(args: ServeArgs) -> CliResult<()> {
    init_logging(&args.log_level, args.log_format)?;

    let config = args.to_config().map_err(|e| {
        error!(error = %e, "invalid configuration");
        CliError::from(e)
    })?;
    config.validate()?;

    let bridge = connect_bridge(&config).await.map_err(|e| {
        error!(error = %e, "failed to start sidecar");
        e
    })?;
    run_bridge(&config, bridge, shutdown_signal()).await
}

/// Bootstrap the configured backend and wrap it in a dispatcher
pub async fn connect_bridge(config: &SidecarConfig) -> CliResult<Arc<dyn Bridge>> {
    let policy = RetryPolicy::default();
    let timeout = config.request_timeout();
    let user = config.user.clone().filter(|u| !u.is_empty());
    let password = config.password.clone().filter(|p| !p.is_empty());

    let bridge: Arc<dyn Bridge> = match config.mode {
        BackendKind::Sql => {
            let connector = PostgresConnector::new(
                &config.backend,
                user,
                password,
                config.database.clone().filter(|db| !db.is_empty()),
            );
            let client = connect_with_retry(&policy, &connector).await?;
            Arc::new(Dispatcher::new(RelationalAdapter::new(client)).with_default_timeout(timeout))
        }
        BackendKind::Kv => {
            let connector = RedisConnector::new(&config.backend, user, password, config.kv_database()?)
                .map_err(|e| CliError::config_error(e.to_string()))?;
            let client = connect_with_retry(&policy, &connector).await?;
            Arc::new(Dispatcher::new(KvAdapter::new(client)).with_default_timeout(timeout))
        }
        BackendKind::Datastore => {
            let database = config.database_or(COLUMNAR_DATABASE);
            let user = user.unwrap_or_else(|| COLUMNAR_USER.to_string());
            let password = password.unwrap_or_default();

            if config.datastore_over_http() {
                let connector =
                    HttpClickHouseConnector::new(&config.backend, user, password, database.clone(), timeout);
                let client = connect_with_retry(&policy, &connector).await?;
                Arc::new(
                    Dispatcher::new(HttpColumnarAdapter::new(client, database))
                        .with_default_timeout(timeout),
                )
            } else {
                let connector =
                    NativeClickHouseConnector::new(&config.backend, user, password, database.clone());
                let client = connect_with_retry(&policy, &connector).await?;
                Arc::new(
                    Dispatcher::new(NativeColumnarAdapter::new(client, database))
                        .with_default_timeout(timeout),
                )
            }
        }
        BackendKind::DocumentDb => {
            let connector = MongoConnector::new(&config.backend).with_credentials(user, password);
            let client = connect_with_retry(&policy, &connector).await?;
            let database = config.database_or(DOCUMENT_DATABASE);
            Arc::new(
                Dispatcher::new(DocumentAdapter::new(client, database)).with_default_timeout(timeout),
            )
        }
    };
    Ok(bridge)
}

/// Serve `bridge` until `shutdown` resolves, then release everything.
/// The bridge is closed on every exit path.
pub async fn run_bridge(
    config: &SidecarConfig,
    bridge: Arc<dyn Bridge>,
    shutdown: impl Future<Output = ()>,
) -> CliResult<()> {
    let mut node = Node::new(config.node_config());
    node.handle(bridge.kind().message_type(), BridgeHandler::new(bridge.clone()));

    let node = match node.start().await {
        Ok(node) => node,
        Err(e) => {
            bridge.close().await;
            return Err(CliError::listen_failed(format!(
                "transport on port {}: {}",
                config.port, e
            )));
        }
    };

    let health = match config.health_port {
        None => None,
        Some(port) => {
            let server = HealthServer::new(HealthServerConfig::with_port(port), bridge.clone());
            match server.start().await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    node.stop().await;
                    bridge.close().await;
                    return Err(CliError::listen_failed(format!("health endpoint on port {}: {}", port, e)));
                }
            }
        }
    };

    info!(
        mode = %config.mode,
        node_id = %config.node_id(),
        port = node.local_addr().port(),
        routes = ?bridge.routes(),
        "zap sidecar started"
    );

    shutdown.await;
    info!("shutting down");

    if let Some(health) = health {
        health.stop().await;
    }
    node.stop().await;
    bridge.close().await;
    info!("sidecar stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// One request against a running sidecar
pub async fn call(args: CallArgs) -> CliResult<()> {
    let body = read_body(&args.body)?;
    let request = encode_request(&args.path, &body);

    let exchange = async {
        let mut client = Client::connect(args.addr.as_str()).await?;
        client.call(args.mode.message_type(), &request).await
    };
    let response = tokio::time::timeout(args.timeout(), exchange)
        .await
        .map_err(|_| CliError::call_failed(format!("no reply within {:?}", args.timeout())))??;

    let reply = Reply::from_message(&response)
        .map_err(|e| CliError::call_failed(format!("unreadable reply: {}", e)))?;
    write_reply(&reply)?;

    if reply.status() >= 400 {
        return Err(CliError::call_failed(format!("status {}", reply.status())));
    }
    Ok(())
}
