//! Network Module
//!
//! Outbound calls from a coordinator to the transaction handlers on its
//! peers.

mod client;

pub use client::HttpPeerClient;

use crate::error::Result;
use crate::replication::{DecisionRequest, PrepareRequest, TransactionResponse};

/// Base path of the peer-facing replication endpoints
pub const REPLICATION_PATH: &str = "/internal/replication";

/// Transport used by the coordinator to reach one peer.
///
/// Any failure (unreachable, timed out, non-success reply) is returned as
/// an `Err`; the coordinator treats every `Err` as "this peer did not
/// confirm".
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn prepare(&self, peer: &str, request: &PrepareRequest) -> Result<TransactionResponse>;

    async fn commit(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse>;

    async fn abort(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse>;
}
