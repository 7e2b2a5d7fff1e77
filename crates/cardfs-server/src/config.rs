//! Server configuration.
//!
//! Loaded from a RON file; every field has a default so a partial file
//! (or none at all) works:
//!
//! ```ron
//! (
//!     card_dir: Some("/media/sdcard"),
//!     url_prefix: "/files",
//!     credentials: Some((username: "admin", password: "secret")),
//!     enable_deletion: false,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Credentials;
use crate::constants::{
    CAPACITY_LOG_INTERVAL, DEFAULT_BIND_ADDRESS, DEFAULT_HTTP_PORT, DEFAULT_MAX_PROPFIND_DEPTH,
    DEFAULT_MOUNT_POINT,
};

/// Error type for config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// Host directory holding the card's filesystem. `None` serves an
    /// in-memory volume.
    pub card_dir: Option<PathBuf>,
    /// Absolute path the card is mounted at.
    pub mount_point: PathBuf,
    /// Directory on the card served as `/`.
    pub root_path: String,
    /// URL prefix the server answers under; other URLs get 404.
    pub url_prefix: String,
    /// Basic auth credentials. `None` disables authorization.
    pub credentials: Option<Credentials>,
    pub enable_download: bool,
    pub enable_upload: bool,
    pub enable_deletion: bool,
    /// Refuse every write at the volume level.
    pub read_only: bool,
    /// Recursion bound for `Depth: infinity`.
    pub max_propfind_depth: u32,
    /// Seconds between capacity log lines; 0 disables them.
    pub capacity_log_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let ip: IpAddr = DEFAULT_BIND_ADDRESS
            .parse()
            .unwrap_or(IpAddr::from([127, 0, 0, 1]));
        Self {
            bind_addr: SocketAddr::new(ip, DEFAULT_HTTP_PORT),
            card_dir: None,
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            root_path: String::new(),
            url_prefix: String::new(),
            credentials: None,
            enable_download: true,
            enable_upload: true,
            enable_deletion: true,
            read_only: false,
            max_propfind_depth: DEFAULT_MAX_PROPFIND_DEPTH,
            capacity_log_secs: CAPACITY_LOG_INTERVAL.as_secs(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a RON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    /// Parse and validate RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mount_point.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "mount_point must be absolute: {}",
                self.mount_point.display()
            )));
        }
        if !self.url_prefix.is_empty() && !self.url_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "url_prefix must start with '/': {}",
                self.url_prefix
            )));
        }
        if self.root_path.split(['/', '\\']).any(|s| s == "..") {
            return Err(ConfigError::Invalid(format!(
                "root_path may not contain '..': {}",
                self.root_path
            )));
        }
        if let Some(creds) = &self.credentials {
            if creds.username.contains(':') {
                return Err(ConfigError::Invalid("username may not contain ':'".into()));
            }
        }
        Ok(())
    }

    /// URL prefix without a trailing slash.
    pub fn normalized_prefix(&self) -> &str {
        self.url_prefix.trim_end_matches('/')
    }

    pub fn capacity_log_interval(&self) -> Option<Duration> {
        (self.capacity_log_secs > 0).then(|| Duration::from_secs(self.capacity_log_secs))
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_card_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.card_dir = Some(dir.into());
        self
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = mount_point.into();
        self
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_download(mut self, enabled: bool) -> Self {
        self.enable_download = enabled;
        self
    }

    pub fn with_upload(mut self, enabled: bool) -> Self {
        self.enable_upload = enabled;
        self
    }

    pub fn with_deletion(mut self, enabled: bool) -> Self {
        self.enable_deletion = enabled;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_max_propfind_depth(mut self, depth: u32) -> Self {
        self.max_propfind_depth = depth;
        self
    }
}
