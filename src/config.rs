//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory holding colonies.csv / colonies.json
    pub data_dir: PathBuf,
}

/// Remote colony server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether to talk to a server at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-attempt connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How long to wait for one response line
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// First reconnect delay, doubled after every failure
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Give up connecting after this many attempts (unset: keep trying)
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,

    /// Attempts per request when the transport fails
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Background tasks allowed to run at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

/// GPS calibration points, named by colony id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub points: Vec<CalibrationPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub colony_id: i32,
    pub latitude: f64,
    pub longitude: f64,
}

// Defaults
fn default_true() -> bool { true }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 7878 }
fn default_connect_timeout() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 10_000 }
fn default_backoff_initial() -> u64 { 250 }
fn default_backoff_max() -> u64 { 30_000 }
fn default_request_attempts() -> u32 { 3 }
fn default_max_concurrent_tasks() -> usize { 8 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            max_connect_attempts: None,
            request_attempts: default_request_attempts(),
        }
    }
}

impl ServerConfig {
    /// `host:port` as given to the socket layer
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Apply a `host:port` override.
    pub fn set_address(&mut self, address: &str) -> Result<()> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| SyncError::Config(format!("expected host:port, got {address}")))?;
        self.port = port
            .parse()
            .map_err(|_| SyncError::Config(format!("invalid port in {address}")))?;
        self.host = host.trim_matches(|c| c == '[' || c == ']').to_string();
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                data_dir: PathBuf::from("/var/lib/colony-sync"),
            },
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl Config {
    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))
    }
}
