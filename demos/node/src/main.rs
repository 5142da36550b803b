//! treesync node
//!
//! Runs either side of a treesync pair.
//!
//! Environment variables:
//! - TREESYNC_MODE: "server" or "client"
//! - TREESYNC_ROOT: Directory to sync (default ./server-files or ./client-files)
//! - TREESYNC_SERVER_URL: Server URL (client only, default ws://localhost:5555/)
//! - TREESYNC_BIND_ADDR: Bind address (server only, default 0.0.0.0:5555)
//! - TREESYNC_POLL_INTERVAL_MS: Scan interval (client only, default 1000)
//! - TREESYNC_ECHO_VALUE: Echo value (client only, default "hello there")
//! - TREESYNC_REQUEST_TIMEOUT_MS: Per-request deadline (client only, default 30000)
//! - TREESYNC_HEALTH_ADDR: Serve /health, /ready and /live on this address
//! - TREESYNC_LOG: Log filter, e.g. "treesync=debug" (falls back to TREESYNC_LOG_LEVEL)

mod client;
mod config;
mod health;
mod server;

use std::process::ExitCode;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use treesync::client::ClientError;
use treesync::server::ServerError;

use crate::config::{ConfigError, Mode, NodeConfig};
use crate::health::HealthState;

/// Anything that stops the node.
#[derive(Debug, Error)]
enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("treesync-node: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "node stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NodeConfig) -> Result<(), NodeError> {
    info!(mode = config.mode.as_str(), root = %config.root.display(), "starting treesync node");

    let health = config.health_addr.map(|addr| {
        let state = match config.mode {
            Mode::Server => HealthState::server(),
            Mode::Client => HealthState::client(),
        };
        let serving = state.clone();
        tokio::spawn(async move {
            if let Err(e) = health::start_health_server(addr, serving).await {
                warn!(%addr, error = %e, "health server stopped");
            }
        });
        state
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                shutdown_tx.send_replace(true);
            }
            Err(e) => {
                // Keep the sender alive so the node does not read this as a shutdown.
                warn!(error = %e, "cannot listen for interrupts");
                std::future::pending::<()>().await;
            }
        }
    });

    match config.mode {
        Mode::Server => server::run(&config, health, shutdown_rx).await?,
        Mode::Client => client::run(&config, health, shutdown_rx).await?,
    }
    Ok(())
}
