//! car-socket: a line-oriented TCP command server and its interactive client
//!
//! The server answers one response line per request line:
//! - `PING` → `PONG`
//! - `CAR <brand>` → car information from the configured lookup backend
//! - `LOGOUT` → `OK Goodbye`, then the connection is closed
//!
//! Features:
//! - One task per connection, responses in request order
//! - Lookup backends: built-in brand table or an HTTP car API
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Configuration via CLI arguments or TOML file

mod client;
mod config;
mod error;
mod lookup;
mod protocol;
mod runtime;
mod server;

use config::{Config, Role};
use protocol::Dispatcher;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.server.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    let result = runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        tokio::spawn(watch_signals(shutdown.clone()));

        match config.role {
            Role::Server => run_server(config, shutdown).await,
            Role::Client => run_client(config, shutdown).await,
        }
    });

    // A pending stdin read holds a blocking thread that never returns.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run_server(
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.server.listen,
        backend = ?config.lookup.backend,
        brand_argument = ?config.lookup.brand_argument,
        max_connections = config.server.max_connections,
        idle_timeout = ?config.server.idle_timeout,
        "Starting car-socket server"
    );

    let lookup = lookup::from_settings(&config.lookup)?;
    let dispatcher = Dispatcher::new(lookup, config.lookup.timeout)
        .with_brand_argument(config.lookup.brand_argument);

    let server = server::Server::bind(&config.server, dispatcher)?;
    server.run(shutdown).await?;
    Ok(())
}

async fn run_client(
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let peer = client::Peer::connect(&config.client.host, config.client.port)
        .await
        .map_err(|e| {
            format!(
                "failed to connect to {}:{}: {e}",
                config.client.host, config.client.port
            )
        })?;

    let input = BufReader::new(tokio::io::stdin());
    let summary = peer.run(input, tokio::io::stdout(), shutdown).await?;
    info!(sent = summary.sent, received = summary.received, "Client finished");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received SIGINT, shutting down");
                    shutdown.cancel();
                }
                return;
            }
        };

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "Failed to listen for SIGINT");
                    return;
                }
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
        shutdown.cancel();
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    }
}
