//! Replication Coordinator
//!
//! Drives one two-phase replication per write: prepare on every peer in
//! parallel, decide on quorum, then commit (or abort) on the peers that
//! prepared.

use std::future::Future;
use std::sync::Arc;
use futures::future::join_all;
use uuid::Uuid;

use super::protocol::{DecisionRequest, PrepareRequest, ReplicationResult, WriteRequest};
use super::{quorum_size, ReplicationConfig};
use crate::error::{Error, Result};
use crate::network::PeerTransport;

/// Protocol phase, used for logging
#[derive(Debug, Clone, Copy)]
enum Phase {
    Prepare,
    Commit,
    Abort,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Prepare => write!(f, "prepare"),
            Phase::Commit => write!(f, "commit"),
            Phase::Abort => write!(f, "abort"),
        }
    }
}

/// Coordinates replication of local writes to a fixed set of peers
pub struct ReplicationCoordinator {
    /// This node's ID, sent as `coordinator_id`
    node_id: String,
    /// Peer base URLs, fixed for the coordinator's lifetime
    peers: Vec<String>,
    /// Transport to the peers' transaction handlers
    transport: Arc<dyn PeerTransport>,
    /// Replication configuration
    config: ReplicationConfig,
}

impl ReplicationCoordinator {
    /// Create a new coordinator
    pub fn new(
        node_id: String,
        peers: Vec<String>,
        transport: Arc<dyn PeerTransport>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            node_id,
            peers,
            transport,
            config,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Cluster size including this node
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Peer confirmations required per write
    pub fn quorum_size(&self) -> usize {
        quorum_size(self.cluster_size())
    }

    /// Replicate a write that has already been applied locally.
    ///
    /// Never fails: every peer error is folded into the returned counts.
    /// Once prepare reaches quorum the write is reported successful, whatever
    /// happens to the individual commit calls.
    pub async fn replicate(&self, write: &WriteRequest) -> ReplicationResult {
        let transaction_id = Uuid::new_v4().to_string();
        let required = self.quorum_size();

        if write.repo_id.trim().is_empty() {
            return ReplicationResult {
                success: false,
                peers_confirmed: 0,
                peers_required: required,
                transaction_id,
                error: Some("repo_id is required".to_string()),
            };
        }

        tracing::info!(
            "Replicating {} {} as transaction {} to {} peers (quorum {})",
            write.operation,
            write.repo_id,
            transaction_id,
            self.peers.len(),
            required
        );

        // Phase 1
        let prepare = PrepareRequest {
            transaction_id: transaction_id.clone(),
            coordinator_id: self.node_id.clone(),
            payload: Some(write.clone()),
        };
        let outcomes = join_all(
            self.peers
                .iter()
                .map(|peer| self.call(peer, Phase::Prepare, self.transport.prepare(peer, &prepare))),
        )
        .await;

        let prepared: Vec<&str> = self
            .peers
            .iter()
            .zip(outcomes)
            .filter(|(_, ok)| *ok)
            .map(|(peer, _)| peer.as_str())
            .collect();
        let confirmed = prepared.len();

        let decision = DecisionRequest {
            transaction_id: transaction_id.clone(),
            coordinator_id: self.node_id.clone(),
        };

        if confirmed < required {
            tracing::warn!(
                "Transaction {} failed: {} of {} required peers prepared",
                transaction_id,
                confirmed,
                required
            );

            // Best-effort cleanup on the peers that did prepare
            self.finish(&prepared, Phase::Abort, &decision).await;

            return ReplicationResult {
                success: false,
                peers_confirmed: confirmed,
                peers_required: required,
                transaction_id,
                error: Some(
                    Error::QuorumNotReached {
                        reached: confirmed,
                        required,
                    }
                    .to_string(),
                ),
            };
        }

        // Phase 2, only to peers holding a prepared record
        let committed = self.finish(&prepared, Phase::Commit, &decision).await;
        if committed < confirmed {
            tracing::warn!(
                "Transaction {}: {} of {} prepared peers did not acknowledge commit",
                transaction_id,
                confirmed - committed,
                confirmed
            );
        }

        tracing::info!(
            "Transaction {} replicated: {} peers confirmed (quorum {})",
            transaction_id,
            confirmed,
            required
        );

        ReplicationResult {
            success: true,
            peers_confirmed: confirmed,
            peers_required: required,
            transaction_id,
            error: None,
        }
    }

    /// Send commit or abort to `peers` concurrently; returns how many acknowledged
    async fn finish(&self, peers: &[&str], phase: Phase, decision: &DecisionRequest) -> usize {
        let outcomes = join_all(peers.iter().map(|peer| async move {
            match phase {
                Phase::Abort => self.call(peer, phase, self.transport.abort(peer, decision)).await,
                _ => self.call(peer, phase, self.transport.commit(peer, decision)).await,
            }
        }))
        .await;

        outcomes.into_iter().filter(|ok| *ok).count()
    }

    /// Run one peer call under the per-call timeout, reducing it to success/failure
    async fn call<F, T>(&self, peer: &str, phase: Phase, call: F) -> bool
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout(), call).await {
            Ok(Ok(_)) => {
                tracing::debug!("{} acknowledged by {}", phase, peer);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("{} failed on {}: {}", phase, peer, e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "{} timed out on {} after {:?}",
                    phase,
                    peer,
                    self.config.call_timeout()
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use crate::replication::{TransactionResponse, TransactionStatus};

    /// How a scripted peer answers prepare
    #[derive(Clone, Copy)]
    enum Behavior {
        Accept,
        Reject,
        Hang,
    }

    /// Transport that records every call and answers from a script
    struct ScriptedTransport {
        behavior: HashMap<String, Behavior>,
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl ScriptedTransport {
        fn new(peers: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behavior: peers.iter().map(|(p, b)| (p.to_string(), *b)).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls_for(&self, kind: &str) -> Vec<String> {
            let mut peers: Vec<String> = self
                .calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, p)| p.clone())
                .collect();
            peers.sort();
            peers
        }

        fn reply(&self, peer: &str, txn: &str, status: TransactionStatus) -> TransactionResponse {
            TransactionResponse {
                status,
                transaction_id: txn.to_string(),
                server_id: peer.to_string(),
                message: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl PeerTransport for ScriptedTransport {
        async fn prepare(&self, peer: &str, request: &PrepareRequest) -> Result<TransactionResponse> {
            self.calls.lock().unwrap().push(("prepare", peer.to_string()));
            match self.behavior[peer] {
                Behavior::Accept => Ok(self.reply(peer, &request.transaction_id, TransactionStatus::Prepared)),
                Behavior::Reject => Err(Error::ConnectionFailed {
                    address: peer.to_string(),
                    reason: "connection refused".into(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(self.reply(peer, &request.transaction_id, TransactionStatus::Prepared))
                }
            }
        }

        async fn commit(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse> {
            self.calls.lock().unwrap().push(("commit", peer.to_string()));
            Ok(self.reply(peer, &request.transaction_id, TransactionStatus::Committed))
        }

        async fn abort(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse> {
            self.calls.lock().unwrap().push(("abort", peer.to_string()));
            Ok(self.reply(peer, &request.transaction_id, TransactionStatus::Aborted))
        }
    }

    fn coordinator(transport: Arc<ScriptedTransport>, timeout_ms: u64) -> ReplicationCoordinator {
        let mut peers: Vec<String> = transport.behavior.keys().cloned().collect();
        peers.sort();
        ReplicationCoordinator::new(
            "node-a".to_string(),
            peers,
            transport,
            ReplicationConfig {
                call_timeout_ms: timeout_ms,
            },
        )
    }

    fn write() -> WriteRequest {
        WriteRequest::new("alice/proj", "create")
    }

    #[tokio::test]
    async fn test_all_peers_prepare() {
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Accept),
            ("c", Behavior::Accept),
            ("d", Behavior::Accept),
        ]);
        let result = coordinator(transport.clone(), 1000).replicate(&write()).await;

        assert!(result.success);
        assert_eq!(result.peers_confirmed, 3);
        assert_eq!(result.peers_required, 1);
        assert!(result.error.is_none());
        assert_eq!(transport.calls_for("prepare"), vec!["b", "c", "d"]);
        assert_eq!(transport.calls_for("commit"), vec!["b", "c", "d"]);
        assert!(transport.calls_for("abort").is_empty());
    }

    #[tokio::test]
    async fn test_exact_quorum_succeeds() {
        // 5 nodes: quorum is 2 peers
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Accept),
            ("c", Behavior::Accept),
            ("d", Behavior::Reject),
            ("e", Behavior::Reject),
        ]);
        let result = coordinator(transport.clone(), 1000).replicate(&write()).await;

        assert!(result.success);
        assert_eq!(result.peers_confirmed, 2);
        assert_eq!(result.peers_required, 2);
        assert_eq!(transport.calls_for("commit"), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_one_below_quorum_fails_and_aborts_prepared_peers() {
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Accept),
            ("c", Behavior::Reject),
            ("d", Behavior::Reject),
            ("e", Behavior::Reject),
        ]);
        let result = coordinator(transport.clone(), 1000).replicate(&write()).await;

        assert!(!result.success);
        assert_eq!(result.peers_confirmed, 1);
        assert_eq!(result.peers_required, 2);
        let message = result.error.unwrap();
        assert!(message.contains("1/2"), "unexpected message: {message}");
        assert!(transport.calls_for("commit").is_empty());
        assert_eq!(transport.calls_for("abort"), vec!["b"]);
    }

    #[tokio::test]
    async fn test_timed_out_peer_counts_as_failure() {
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Accept),
            ("c", Behavior::Hang),
        ]);
        let started = Instant::now();
        let result = coordinator(transport.clone(), 100).replicate(&write()).await;

        assert!(result.success);
        assert_eq!(result.peers_confirmed, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(transport.calls_for("commit"), vec!["b"]);
    }

    #[tokio::test]
    async fn test_prepares_run_in_parallel() {
        // Each hanging call is cut off by the timeout; sequential calls would take 4x as long
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Hang),
            ("c", Behavior::Hang),
            ("d", Behavior::Hang),
            ("e", Behavior::Hang),
        ]);
        let started = Instant::now();
        let result = coordinator(transport.clone(), 300).replicate(&write()).await;

        assert!(!result.success);
        assert_eq!(result.peers_confirmed, 0);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(transport.calls_for("abort").is_empty());
    }

    #[tokio::test]
    async fn test_two_node_cluster_peer_down() {
        let transport = ScriptedTransport::new(&[("b", Behavior::Reject)]);
        let result = coordinator(transport.clone(), 1000).replicate(&write()).await;

        assert!(!result.success);
        assert_eq!(result.peers_confirmed, 0);
        assert_eq!(result.peers_required, 1);
    }

    #[tokio::test]
    async fn test_six_node_cluster_with_two_failures() {
        let transport = ScriptedTransport::new(&[
            ("b", Behavior::Accept),
            ("c", Behavior::Reject),
            ("d", Behavior::Accept),
            ("e", Behavior::Hang),
            ("f", Behavior::Accept),
        ]);
        let result = coordinator(transport.clone(), 100).replicate(&write()).await;

        assert!(result.success);
        assert_eq!(result.peers_required, 2);
        assert_eq!(result.peers_confirmed, 3);
        assert_eq!(transport.calls_for("commit"), vec!["b", "d", "f"]);
    }

    #[tokio::test]
    async fn test_single_node_cluster() {
        let transport = ScriptedTransport::new(&[]);
        let result = coordinator(transport.clone(), 1000).replicate(&write()).await;

        assert!(result.success);
        assert_eq!(result.peers_confirmed, 0);
        assert_eq!(result.peers_required, 0);
    }

    #[tokio::test]
    async fn test_missing_repo_id_contacts_nobody() {
        let transport = ScriptedTransport::new(&[("b", Behavior::Accept)]);
        let result = coordinator(transport.clone(), 1000)
            .replicate(&WriteRequest::new("", "create"))
            .await;

        assert!(!result.success);
        assert!(transport.calls_for("prepare").is_empty());
    }

    #[tokio::test]
    async fn test_transaction_ids_are_unique() {
        let transport = ScriptedTransport::new(&[("b", Behavior::Accept)]);
        let coordinator = coordinator(transport, 1000);

        let first = coordinator.replicate(&write()).await;
        let second = coordinator.replicate(&write()).await;
        assert_ne!(first.transaction_id, second.transaction_id);
        assert!(Uuid::parse_str(&first.transaction_id).is_ok());
    }
}
