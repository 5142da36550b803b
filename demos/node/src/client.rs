//! Client mode: the polling loop.
//!
//! Every tick sends one echo request and one sync cycle. A lost session is
//! re-established with a fresh connect; if that connect exhausts its
//! attempts the node exits.

use std::time::SystemTime;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use treesync::client::{ClientConfig, ClientError, FileWatcher, SyncClient, SyncClientBuilder};

use crate::config::NodeConfig;
use crate::health::HealthState;

/// Run the polling loop until `shutdown` flips to `true`.
pub async fn run(
    config: &NodeConfig,
    health: Option<HealthState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ClientError> {
    if let Err(e) = tokio::fs::create_dir_all(&config.root).await {
        warn!(root = %config.root.display(), error = %e, "cannot create sync root");
    }

    let client_config = client_config(config);
    let mut watcher = FileWatcher::new(config.root.clone());
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        url = %client_config.server_url,
        root = %config.root.display(),
        interval = ?config.poll_interval,
        "client starting"
    );

    'session: loop {
        let client = SyncClient::connect(client_config.clone()).await?;
        if let Some(health) = &health {
            health.set_connected(true).await;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("closing session");
                    if let Err(e) = client.close().await {
                        debug!(error = %e, "close frame not sent");
                    }
                    break 'session;
                }
                _ = ticker.tick() => {}
            }

            match cycle(&client, &mut watcher, &config.echo_value).await {
                Ok(()) => {
                    if let Some(health) = &health {
                        health.set_healthy(true).await;
                        health
                            .set_last_sync(watcher.last_sync().unwrap_or_else(SystemTime::now))
                            .await;
                    }
                }
                Err(e) if e.is_connection_failure() => {
                    warn!(error = %e, "session lost, reconnecting");
                    if let Some(health) = &health {
                        health.set_connected(false).await;
                    }
                    continue 'session;
                }
                Err(e) => {
                    warn!(error = %e, "sync cycle failed, retrying next tick");
                    if let Some(health) = &health {
                        health.set_healthy(false).await;
                    }
                }
            }
        }
    }

    if let Some(health) = &health {
        health.set_connected(false).await;
    }
    Ok(())
}

/// One tick: echo request, then one sync cycle.
async fn cycle(
    client: &SyncClient,
    watcher: &mut FileWatcher,
    echo_value: &str,
) -> Result<(), ClientError> {
    info!(value = %echo_value, "sending echo");
    let echoed = client.echo(echo_value).await?;
    info!(value = %echoed, "received echo");

    let outcome = watcher.sync(client).await?;
    if outcome.sent_anything() {
        info!(
            upserts = outcome.upserts,
            deletes = outcome.deletes,
            failed = outcome.failed.len(),
            skipped = outcome.skipped.len(),
            "changes delivered"
        );
    }
    Ok(())
}

fn client_config(config: &NodeConfig) -> ClientConfig {
    SyncClientBuilder::new()
        .server_url(config.server_url.clone())
        .request_timeout(config.request_timeout)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_from_node_config() {
        let node = NodeConfig::from_lookup(|var| match var {
            "TREESYNC_MODE" => Some("client".into()),
            "TREESYNC_SERVER_URL" => Some("ws://10.0.0.2:5555/".into()),
            "TREESYNC_REQUEST_TIMEOUT_MS" => Some("2500".into()),
            _ => None,
        })
        .unwrap();

        let config = client_config(&node);
        assert_eq!(config.server_url, "ws://10.0.0.2:5555/");
        assert_eq!(config.request_timeout, std::time::Duration::from_millis(2500));
        assert_eq!(config.max_connect_attempts, 100);
    }
}
