//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default HTTP port for the file server.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default bind address (localhost only for security).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Where the card appears in absolute paths.
pub const DEFAULT_MOUNT_POINT: &str = "/sdcard";

/// Deepest recursion served for `Depth: infinity` listings.
pub const DEFAULT_MAX_PROPFIND_DEPTH: u32 = 8;

/// Upper bound on a single streamed download chunk handed to the network.
pub const STREAM_CHUNK_MAX: usize = 64 * 1024;

/// How often the binary logs card capacity.
pub const CAPACITY_LOG_INTERVAL: Duration = Duration::from_secs(300);

/// Realm announced in `WWW-Authenticate`.
pub const AUTH_REALM: &str = "cardfs";

/// `DAV` compliance class reported by OPTIONS.
pub const DAV_COMPLIANCE: &str = "1";
