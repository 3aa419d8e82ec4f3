//! QuorumRepo Configuration
//!
//! This module provides configuration structures for a QuorumRepo node.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::replication::quorum_size;

/// Main QuorumRepo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumRepoConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    pub id: String,

    /// Root directory for hosted repositories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Peer base URLs (e.g. "http://node-2:8080"), excluding this node
    #[serde(default)]
    pub peers: Vec<String>,

    /// Timeout applied to every prepare/commit/abort call, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/quorumrepo")
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl QuorumRepoConfig {
    /// Build a configuration for a node with default settings
    pub fn new(node_id: impl Into<String>, data_dir: PathBuf) -> Self {
        Self {
            node: NodeConfig {
                id: node_id.into(),
                data_dir,
            },
            cluster: ClusterConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: QuorumRepoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.trim().is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        if self.cluster.call_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "cluster.call_timeout_ms must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.cluster.peers {
            if peer.trim().is_empty() {
                return Err(crate::Error::Config("cluster.peers contains an empty entry".into()));
            }
            if !seen.insert(peer.trim_end_matches('/')) {
                return Err(crate::Error::Config(format!(
                    "cluster.peers lists {} more than once",
                    peer
                )));
            }
        }

        Ok(())
    }

    /// Get the repository root directory
    pub fn data_dir(&self) -> &PathBuf {
        &self.node.data_dir
    }

    /// Get the per-call peer timeout as Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.call_timeout_ms)
    }

    /// Total number of nodes, including this one
    pub fn cluster_size(&self) -> usize {
        self.cluster.peers.len() + 1
    }

    /// Number of peer confirmations a write needs
    pub fn quorum_size(&self) -> usize {
        quorum_size(self.cluster_size())
    }
}
