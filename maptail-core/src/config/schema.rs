//! Configuration schema types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete process configuration, read once at startup
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub geoip: GeoIpConfig,
}

/// HTTP front-end settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route prefix for the event stream and static assets
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Seconds between SSE heartbeat comments (0 disables)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_path() -> String {
    "/".to_string()
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_keepalive_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
            public_dir: default_public_dir(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl ServerConfig {
    /// Base path with a leading slash and no trailing slash ("" for root)
    pub fn route_prefix(&self) -> String {
        normalize_base_path(&self.base_path)
    }
}

/// Ingestion and fan-out settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StreamConfig {
    /// Capacity of the geo event history
    #[serde(default = "default_history")]
    pub geo_history: usize,
    /// Capacity of the raw line history
    #[serde(default = "default_history")]
    pub log_history: usize,
    /// Do not echo stdin lines to stdout
    #[serde(default)]
    pub silent: bool,
    /// Broadcast raw lines as "log" events
    #[serde(default = "default_true")]
    pub forward_logs: bool,
    /// Replay raw line history to newly connected viewers
    #[serde(default = "default_true")]
    pub replay_logs: bool,
    /// Feed our own log output back into the pipeline
    #[serde(default = "default_true")]
    pub self_ingest: bool,
    /// Outbound queue length per viewer
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
    #[serde(default = "default_max_inflight_lookups")]
    pub max_inflight_lookups: usize,
}

fn default_history() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_subscriber_queue() -> usize {
    256
}

fn default_max_inflight_lookups() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            geo_history: default_history(),
            log_history: default_history(),
            silent: false,
            forward_logs: true,
            replay_logs: true,
            self_ingest: true,
            subscriber_queue: default_subscriber_queue(),
            max_inflight_lookups: default_max_inflight_lookups(),
        }
    }
}

/// MaxMind database locations, one per address family
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GeoIpConfig {
    #[serde(default)]
    pub ipv4_db: Option<PathBuf>,
    /// Falls back to `ipv4_db` (City databases cover both families)
    #[serde(default)]
    pub ipv6_db: Option<PathBuf>,
}

impl GeoIpConfig {
    pub fn effective_ipv6_db(&self) -> Option<&PathBuf> {
        self.ipv6_db.as_ref().or(self.ipv4_db.as_ref())
    }

    pub fn is_configured(&self) -> bool {
        self.ipv4_db.is_some() || self.ipv6_db.is_some()
    }
}

/// Normalize a route prefix: ensure a leading '/', strip trailing ones.
/// The root path normalizes to the empty string.
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
