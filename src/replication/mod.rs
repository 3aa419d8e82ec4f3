//! Replication Module
//!
//! Synchronous two-phase replication of writes to peer nodes. The
//! coordinator runs on the node that accepted the write; every node runs a
//! transaction handler that serves the peer side of the protocol.

pub mod protocol;
mod coordinator;
mod transaction;

pub use protocol::{
    DecisionRequest, PrepareRequest, ReplicationResult, TransactionResponse, TransactionStatus,
    WriteRequest,
};
pub use coordinator::ReplicationCoordinator;
pub use transaction::{Transaction, TransactionCounts, TransactionHandler};

use std::time::Duration;

/// Configuration for replication
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Timeout for each individual peer call in milliseconds
    pub call_timeout_ms: u64,
}

impl ReplicationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5000,
        }
    }
}

impl From<&crate::config::QuorumRepoConfig> for ReplicationConfig {
    fn from(config: &crate::config::QuorumRepoConfig) -> Self {
        Self {
            call_timeout_ms: config.cluster.call_timeout_ms,
        }
    }
}

/// Number of peer confirmations required for a cluster of `cluster_size`
/// nodes (coordinator included).
///
/// The coordinator's own write counts toward the majority, so the general
/// rule is `ceil(N/2) - 1` peers. Two nodes are special: the general rule
/// yields zero there, which would commit with no peer at all, so the sole
/// peer must confirm.
pub fn quorum_size(cluster_size: usize) -> usize {
    match cluster_size {
        0 | 1 => 0,
        2 => 1,
        n => n.div_ceil(2) - 1,
    }
}
