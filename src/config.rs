//! Configuration loading and types for peerstore.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; a missing file yields the
//! defaults.  Command-line flags are applied on top by the binary.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity of this node.
    #[serde(default)]
    pub node: NodeConfig,

    /// Static peer set.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Replica store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Protocol intervals and per-call timeouts.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// This node's network identity.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Address peers use to reach this node (`host:port`).  Also the value
    /// reported in election polls and compared on uptime ties.
    #[serde(default = "default_node_address")]
    pub address: String,

    /// Human-readable name, used only in logs.
    #[serde(default)]
    pub name: Option<String>,
}

impl NodeConfig {
    /// Name used in logs, falling back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_node_address(),
            name: None,
        }
    }
}

/// Cluster membership.  The peer set is fixed for the process lifetime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterConfig {
    /// Addresses (`host:port`) of every node, this one may be included.
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Replica store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `users.json` and `bids.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Protocol timing, all in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Leader heartbeat send interval.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// How often followers check heartbeat age.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Heartbeat age after which a follower starts an election.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Timeout for a single `/election` poll.
    #[serde(default = "default_election_poll_timeout_ms")]
    pub election_poll_timeout_ms: u64,

    /// Timeout for a single `/new_leader` broadcast.
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,

    /// Timeout for heartbeat, forward, replication and lock-status calls.
    #[serde(default = "default_peer_call_timeout_ms")]
    pub peer_call_timeout_ms: u64,

    /// Timeout for the startup `/data` fetch.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Total budget of a gated read or authentication.
    #[serde(default = "default_read_budget_ms")]
    pub read_budget_ms: u64,

    /// Pause between lock-status polls.
    #[serde(default = "default_read_pacing_ms")]
    pub read_pacing_ms: u64,

    /// Pause between startup election attempts.
    #[serde(default = "default_startup_backoff_ms")]
    pub startup_backoff_ms: u64,
}

impl TimingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn election_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.election_poll_timeout_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn peer_call_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_call_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn read_budget(&self) -> Duration {
        Duration::from_millis(self.read_budget_ms)
    }

    pub fn read_pacing(&self) -> Duration {
        Duration::from_millis(self.read_pacing_ms)
    }

    pub fn startup_backoff(&self) -> Duration {
        Duration::from_millis(self.startup_backoff_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            election_poll_timeout_ms: default_election_poll_timeout_ms(),
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
            peer_call_timeout_ms: default_peer_call_timeout_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
            read_budget_ms: default_read_budget_ms(),
            read_pacing_ms: default_read_pacing_ms(),
            startup_backoff_ms: default_startup_backoff_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

impl Config {
    /// Peers other than this node, in configured order, deduplicated.
    pub fn other_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        for peer in &self.cluster.peers {
            let peer = peer.trim();
            if peer.is_empty() || peer == self.node.address || peers.iter().any(|p| p == peer) {
                continue;
            }
            peers.push(peer.to_string());
        }
        peers
    }

    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.address.trim().is_empty() {
            anyhow::bail!("node.address must not be empty");
        }
        let timing = &self.timing;
        if timing.heartbeat_timeout_ms <= timing.heartbeat_interval_ms {
            anyhow::bail!(
                "timing.heartbeat_timeout_ms ({}) must exceed timing.heartbeat_interval_ms ({})",
                timing.heartbeat_timeout_ms,
                timing.heartbeat_interval_ms
            );
        }
        if timing.read_pacing_ms == 0 {
            anyhow::bail!("timing.read_pacing_ms must be positive");
        }
        Ok(())
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_node_address() -> String {
    "127.0.0.1:5001".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_monitor_interval_ms() -> u64 {
    10_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}

fn default_election_poll_timeout_ms() -> u64 {
    20_000
}

fn default_broadcast_timeout_ms() -> u64 {
    5_000
}

fn default_peer_call_timeout_ms() -> u64 {
    2_000
}

fn default_sync_timeout_ms() -> u64 {
    5_000
}

fn default_read_budget_ms() -> u64 {
    30_000
}

fn default_read_pacing_ms() -> u64 {
    2_000
}

fn default_startup_backoff_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A file that does not exist yields [`Config::default`].
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
