//! Protocol and runtime defaults.
//!
//! Wire-visible values (request type tags, acknowledgement text) MUST NOT
//! change without breaking existing peers.

use std::time::Duration;

// =============================================================================
// CONNECTION
// =============================================================================

/// Default server endpoint for clients.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:5555/";

/// Default listen address for servers.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5555";

/// Handshake attempts before `connect` gives up.
pub const MAX_CONNECTION_ATTEMPTS: u32 = 100;

/// Delay between handshake attempts (retries are immediate by default).
pub const CONNECT_RETRY_DELAY: Duration = Duration::ZERO;

/// Largest inbound WebSocket message, in bytes. `None` accepts messages of
/// any size, since one change-set travels as a single frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: Option<usize> = None;

/// Maximum concurrently served peers per server instance.
pub const DEFAULT_MAX_SESSIONS: usize = 1;

// =============================================================================
// WEBSOCKET CLOSE CODES (RFC 6455 §7.4.1)
// =============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Reserved: no status code was present.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Reserved: connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close codes that end a session quietly.
pub const EXPECTED_CLOSE_CODES: [u16; 4] =
    [CLOSE_NORMAL, CLOSE_GOING_AWAY, CLOSE_NO_STATUS, CLOSE_ABNORMAL];

// =============================================================================
// RPC
// =============================================================================

/// Deadline for a single `issue` call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire tag for echo requests.
pub const REQUEST_TYPE_ECHO: &str = "ECHO";

/// Wire tag for file-watch requests.
pub const REQUEST_TYPE_FILE_WATCH: &str = "FILE_WATCH";

/// Acknowledgement text carried by every file-watch response.
pub const FILE_WATCH_ACK: &str = "Received file watch request.";

// =============================================================================
// SYNC LOOP
// =============================================================================

/// Interval between scans in the polling loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Name prefix of the scratch files used while replacing a file's content.
/// A random suffix keeps them from colliding with synced files.
pub const TEMP_FILE_PREFIX: &str = ".treesync-";

/// Permission bits of written files, before the umask.
pub const FILE_MODE: u32 = 0o644;
