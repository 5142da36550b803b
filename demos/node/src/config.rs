//! Node configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use treesync::core::{DEFAULT_BIND_ADDR, DEFAULT_SERVER_URL, POLL_INTERVAL, REQUEST_TIMEOUT};

/// Default client root.
const DEFAULT_CLIENT_ROOT: &str = "./client-files";

/// Default server root.
const DEFAULT_SERVER_ROOT: &str = "./server-files";

/// Default echo value.
const DEFAULT_ECHO_VALUE: &str = "hello there";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable could not be parsed.
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Which side this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Accept connections and apply change-sets.
    Server,
    /// Poll a root and ship its changes.
    Client,
}

impl Mode {
    /// Name used in logs and the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Server => "server",
            Mode::Client => "client",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Mode::Server),
            "client" => Ok(Mode::Client),
            other => Err(format!("expected \"server\" or \"client\", got {other:?}")),
        }
    }
}

/// Everything the node reads from its environment.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// TREESYNC_MODE.
    pub mode: Mode,
    /// TREESYNC_ROOT.
    pub root: PathBuf,
    /// TREESYNC_SERVER_URL (client).
    pub server_url: String,
    /// TREESYNC_BIND_ADDR (server).
    pub bind_addr: SocketAddr,
    /// TREESYNC_POLL_INTERVAL_MS (client).
    pub poll_interval: Duration,
    /// TREESYNC_ECHO_VALUE (client).
    pub echo_value: String,
    /// TREESYNC_REQUEST_TIMEOUT_MS (client).
    pub request_timeout: Duration,
    /// TREESYNC_HEALTH_ADDR; no health server when unset.
    pub health_addr: Option<SocketAddr>,
    /// TREESYNC_LOG, falling back to TREESYNC_LOG_LEVEL.
    pub log_filter: String,
}

impl NodeConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mode: Mode = parse(
            "TREESYNC_MODE",
            get("TREESYNC_MODE").ok_or(ConfigError::Missing("TREESYNC_MODE"))?,
        )?;

        let root = get("TREESYNC_ROOT").map(PathBuf::from).unwrap_or_else(|| {
            PathBuf::from(match mode {
                Mode::Server => DEFAULT_SERVER_ROOT,
                Mode::Client => DEFAULT_CLIENT_ROOT,
            })
        });

        let bind_addr = parse(
            "TREESYNC_BIND_ADDR",
            get("TREESYNC_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let poll_interval = match get("TREESYNC_POLL_INTERVAL_MS") {
            Some(ms) => Duration::from_millis(parse("TREESYNC_POLL_INTERVAL_MS", ms)?),
            None => POLL_INTERVAL,
        };

        let request_timeout = match get("TREESYNC_REQUEST_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse("TREESYNC_REQUEST_TIMEOUT_MS", ms)?),
            None => REQUEST_TIMEOUT,
        };

        let health_addr = get("TREESYNC_HEALTH_ADDR")
            .map(|addr| parse("TREESYNC_HEALTH_ADDR", addr))
            .transpose()?;

        let log_filter = get("TREESYNC_LOG")
            .or_else(|| get("TREESYNC_LOG_LEVEL"))
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            mode,
            root,
            server_url: get("TREESYNC_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            bind_addr,
            poll_interval,
            echo_value: get("TREESYNC_ECHO_VALUE").unwrap_or_else(|| DEFAULT_ECHO_VALUE.to_string()),
            request_timeout,
            health_addr,
            log_filter,
        })
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_client_defaults() {
        let config = config(&[("TREESYNC_MODE", "client")]).unwrap();
        assert_eq!(config.mode, Mode::Client);
        assert_eq!(config.root, PathBuf::from("./client-files"));
        assert_eq!(config.server_url, "ws://localhost:5555/");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.echo_value, "hello there");
        assert!(config.health_addr.is_none());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_server_overrides() {
        let config = config(&[
            ("TREESYNC_MODE", "SERVER"),
            ("TREESYNC_ROOT", "/srv/mirror"),
            ("TREESYNC_BIND_ADDR", "127.0.0.1:7000"),
            ("TREESYNC_HEALTH_ADDR", "127.0.0.1:8080"),
            ("TREESYNC_LOG_LEVEL", "debug"),
        ])
        .unwrap();
        assert_eq!(config.mode, Mode::Server);
        assert_eq!(config.root, PathBuf::from("/srv/mirror"));
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.health_addr.unwrap().port(), 8080);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_mode_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("TREESYNC_MODE"))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("TREESYNC_MODE", "peer")]),
            Err(ConfigError::Invalid { var: "TREESYNC_MODE", .. })
        ));
        assert!(matches!(
            config(&[("TREESYNC_MODE", "client"), ("TREESYNC_POLL_INTERVAL_MS", "soon")]),
            Err(ConfigError::Invalid { var: "TREESYNC_POLL_INTERVAL_MS", .. })
        ));
    }
}
