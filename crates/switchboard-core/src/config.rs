//! Configuration system for Switchboard.
//!
//! Resolution order: defaults → config file → environment variables.
//! Command-line flags are applied on top by the daemon.
//!
//! Config file location:
//!   1. $SWITCHBOARD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/switchboard/config.toml
//!   3. ~/.config/switchboard/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub network: NetworkConfig,
    pub tls: TlsConfig,
    pub relay: RelayConfig,
    pub page: PageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address of the endpoint serving the landing page and status API.
    pub page_addr: SocketAddr,
    /// Address of the WebSocket signaling endpoint.
    pub signal_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve both endpoints over TLS. Disable only for local development.
    pub enabled: bool,
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// What to do when a peer connects with an id that is already registered.
    pub duplicate_peer_policy: DuplicatePeerPolicy,
    /// Outbound frames buffered per peer before it is treated as too slow
    /// and disconnected.
    pub send_queue_capacity: usize,
    /// Time a closing connection gets to flush queued frames.
    pub flush_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// HTML file served at `/` on the page endpoint.
    pub index_path: PathBuf,
}

/// Handling of a second connection that claims a registered peer id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePeerPolicy {
    /// Newest connection takes over the id; the older one stops receiving.
    #[default]
    Replace,
    /// Newest connection is closed before it is registered.
    Reject,
}

impl FromStr for DuplicatePeerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown duplicate peer policy {other:?} (expected replace or reject)"
            )),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            page_addr: SocketAddr::from(([0, 0, 0, 0], 4443)),
            signal_addr: SocketAddr::from(([0, 0, 0, 0], 4445)),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: PathBuf::from("certificate/server.crt"),
            key_path: PathBuf::from("certificate/server.key"),
            handshake_timeout_secs: 10,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            duplicate_peer_policy: DuplicatePeerPolicy::Replace,
            send_queue_capacity: 256,
            flush_timeout_ms: 1_000,
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("public/index.html"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("switchboard")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value for {0}: {1}")]
    InvalidEnv(&'static str, String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SwitchboardConfig {
    /// Load config: file → env vars, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            SwitchboardConfig::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SWITCHBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.send_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "relay.send_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply SWITCHBOARD_* env var overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: FromStr>(key: &'static str, v: String) -> Result<T, ConfigError> {
            v.parse().map_err(|_| ConfigError::InvalidEnv(key, v))
        }

        if let Some(v) = lookup("SWITCHBOARD_NETWORK__PAGE_ADDR") {
            self.network.page_addr = parse("SWITCHBOARD_NETWORK__PAGE_ADDR", v)?;
        }
        if let Some(v) = lookup("SWITCHBOARD_NETWORK__SIGNAL_ADDR") {
            self.network.signal_addr = parse("SWITCHBOARD_NETWORK__SIGNAL_ADDR", v)?;
        }
        if let Some(v) = lookup("SWITCHBOARD_TLS__ENABLED") {
            self.tls.enabled = v == "true" || v == "1";
        }
        if let Some(v) = lookup("SWITCHBOARD_TLS__CERT_PATH") {
            self.tls.cert_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SWITCHBOARD_TLS__KEY_PATH") {
            self.tls.key_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SWITCHBOARD_TLS__HANDSHAKE_TIMEOUT_SECS") {
            self.tls.handshake_timeout_secs = parse("SWITCHBOARD_TLS__HANDSHAKE_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("SWITCHBOARD_RELAY__DUPLICATE_PEER_POLICY") {
            self.relay.duplicate_peer_policy = v
                .parse()
                .map_err(|e| ConfigError::InvalidEnv("SWITCHBOARD_RELAY__DUPLICATE_PEER_POLICY", e))?;
        }
        if let Some(v) = lookup("SWITCHBOARD_RELAY__SEND_QUEUE_CAPACITY") {
            self.relay.send_queue_capacity = parse("SWITCHBOARD_RELAY__SEND_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = lookup("SWITCHBOARD_RELAY__FLUSH_TIMEOUT_MS") {
            self.relay.flush_timeout_ms = parse("SWITCHBOARD_RELAY__FLUSH_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("SWITCHBOARD_PAGE__INDEX_PATH") {
            self.page.index_path = PathBuf::from(v);
        }
        Ok(())
    }
}
