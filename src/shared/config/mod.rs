//! Call configuration
//!
//! ICE servers, realtime topic naming and the remote-track polling fallback.
//!
//! Values are resolved in this order, later sources winning:
//!
//! 1. built-in defaults (public STUN servers, `signaling` prefix, 1s polling)
//! 2. a TOML file (`$CONFIG_DIR/xfcall/call.toml` or an explicit path)
//! 3. environment variables (`XFCALL_ICE_SERVERS`, `XFCALL_TOPIC_PREFIX`,
//!    `XFCALL_TRACK_POLL_MS`)
//!
//! ```toml
//! topic_prefix = "signaling"
//! track_poll_interval_ms = 1000
//!
//! [[ice_servers]]
//! urls = ["stun:stun.l.google.com:19302"]
//!
//! [[ice_servers]]
//! urls = ["turn:turn.example.com:3478"]
//! username = "user"
//! credential = "secret"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default public STUN servers
pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:global.stun.twilio.com:3478",
];

/// Default realtime topic prefix
pub const DEFAULT_TOPIC_PREFIX: &str = "signaling";

/// Default remote-track polling interval
pub const DEFAULT_TRACK_POLL_MS: u64 = 1000;

/// One STUN or TURN server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    /// Create a STUN-only server entry
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server entry with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::MissingValue("ice_servers.urls"));
        }
        for url in &self.urls {
            let scheme = url.split(':').next().unwrap_or_default();
            match scheme {
                "stun" | "stuns" => {}
                "turn" | "turns" => {
                    if self.username.is_none() {
                        return Err(ConfigError::MissingValue("ice_servers.username"));
                    }
                    if self.credential.is_none() {
                        return Err(ConfigError::MissingValue("ice_servers.credential"));
                    }
                }
                _ => return Err(ConfigError::InvalidUrl(url.clone())),
            }
        }
        Ok(())
    }
}

/// Call layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// ICE servers handed to every peer connection
    pub ice_servers: Vec<IceServer>,
    /// Prefix of the realtime topic, `"{prefix}:{room_id}"`
    pub topic_prefix: String,
    /// Remote track polling fallback, `None` for event-driven only
    pub track_poll_interval_ms: Option<u64>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_STUN_SERVERS.iter().map(|url| IceServer::stun(url)).collect(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            track_poll_interval_ms: Some(DEFAULT_TRACK_POLL_MS),
        }
    }
}

impl CallConfig {
    /// Create a new CallConfigBuilder
    pub fn builder() -> CallConfigBuilder {
        CallConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        if self.topic_prefix.is_empty() {
            return Err(ConfigError::MissingValue("topic_prefix"));
        }
        if self.topic_prefix.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: "topic_prefix",
                message: "must not contain ':'".to_string(),
            });
        }
        if self.track_poll_interval_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "track_poll_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn track_poll_interval(&self) -> Option<Duration> {
        self.track_poll_interval_ms.map(Duration::from_millis)
    }

    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xfcall").join("call.toml"))
    }

    /// Load from the default file (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit TOML file plus environment overrides
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path.as_ref())?.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("[Config] Reading call config from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(servers) = std::env::var("XFCALL_ICE_SERVERS") {
            let servers: Vec<IceServer> = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(IceServer::stun)
                .collect();
            if !servers.is_empty() {
                self.ice_servers = servers;
            }
        }
        if let Ok(prefix) = std::env::var("XFCALL_TOPIC_PREFIX") {
            self.topic_prefix = prefix;
        }
        if let Ok(poll) = std::env::var("XFCALL_TRACK_POLL_MS") {
            let ms = poll.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                field: "XFCALL_TRACK_POLL_MS",
                message: format!("'{}' is not a number of milliseconds", poll),
            })?;
            self.track_poll_interval_ms = if ms == 0 { None } else { Some(ms) };
        }
        Ok(self)
    }
}

/// Builder for CallConfig
#[derive(Debug, Default)]
pub struct CallConfigBuilder {
    ice_servers: Option<Vec<IceServer>>,
    topic_prefix: Option<String>,
    track_poll_interval_ms: Option<Option<u64>>,
}

impl CallConfigBuilder {
    /// Replace the ICE server list
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = Some(servers);
        self
    }

    /// Set the realtime topic prefix
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    /// Set the remote track polling interval; `None` disables polling
    pub fn track_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.track_poll_interval_ms = Some(interval.map(|d| d.as_millis() as u64));
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<CallConfig, ConfigError> {
        let defaults = CallConfig::default();
        let config = CallConfig {
            ice_servers: self.ice_servers.unwrap_or(defaults.ice_servers),
            topic_prefix: self.topic_prefix.unwrap_or(defaults.topic_prefix),
            track_poll_interval_ms: self
                .track_poll_interval_ms
                .unwrap_or(defaults.track_poll_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ICE server URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}
