//! Transaction Handler
//!
//! Peer side of the two-phase protocol. Prepare stages the write directly
//! against storage and records the transaction; commit and abort only move
//! the record's status forward.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::protocol::{
    DecisionRequest, PrepareRequest, TransactionResponse, TransactionStatus, WriteRequest,
};
use crate::error::{Error, Result};
use crate::storage::{RepoId, RepoStorage};

/// One replication attempt as seen by this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub coordinator_id: String,
    pub payload: WriteRequest,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Number of known transactions per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCounts {
    pub prepared: usize,
    pub committed: usize,
    pub aborted: usize,
}

/// In-memory transaction table for one node.
///
/// Records are never evicted and do not survive a restart.
pub struct TransactionHandler {
    /// This node's ID, echoed back as `server_id`
    node_id: String,
    /// Storage the prepare phase applies writes to
    storage: Arc<dyn RepoStorage>,
    /// transaction_id -> record
    transactions: RwLock<HashMap<String, Transaction>>,
}

impl TransactionHandler {
    pub fn new(node_id: String, storage: Arc<dyn RepoStorage>) -> Self {
        Self {
            node_id,
            storage,
            transactions: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Stage a write and record it as prepared.
    ///
    /// Repeating a prepare for a known transaction re-runs the (idempotent)
    /// staging step and leaves the existing record untouched.
    pub async fn prepare(&self, request: PrepareRequest) -> Result<TransactionResponse> {
        require("transaction_id", &request.transaction_id)?;
        require("coordinator_id", &request.coordinator_id)?;
        let payload = match request.payload {
            Some(payload) => payload,
            None => return Err(Error::Validation("payload is required".into())),
        };
        require("payload.repo_id", &payload.repo_id)?;

        let repo = RepoId::parse(&payload.repo_id)?;
        let created = self.storage.create_if_absent(&repo).await?;
        tracing::debug!(
            "Transaction {} staged {} for {} (created: {})",
            request.transaction_id,
            repo,
            request.coordinator_id,
            created
        );

        let mut transactions = self.transactions.write().await;
        let record = transactions
            .entry(request.transaction_id.clone())
            .or_insert_with(|| Transaction {
                transaction_id: request.transaction_id.clone(),
                coordinator_id: request.coordinator_id.clone(),
                payload,
                status: TransactionStatus::Prepared,
                created_at: Utc::now(),
            });

        Ok(self.respond(record.status, &record.transaction_id, None))
    }

    /// Finalize a prepared transaction.
    ///
    /// Fails with `TransactionNotFound` if this node never prepared it.
    pub async fn commit(&self, request: &DecisionRequest) -> Result<TransactionResponse> {
        require("transaction_id", &request.transaction_id)?;
        require("coordinator_id", &request.coordinator_id)?;

        let mut transactions = self.transactions.write().await;
        let record = transactions
            .get_mut(&request.transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(request.transaction_id.clone()))?;

        match record.status {
            TransactionStatus::Prepared => {
                record.status = TransactionStatus::Committed;
                tracing::debug!("Transaction {} committed", record.transaction_id);
            }
            TransactionStatus::Committed => {}
            TransactionStatus::Aborted => {
                tracing::warn!(
                    "Commit for already aborted transaction {} from {} ignored",
                    record.transaction_id,
                    request.coordinator_id
                );
            }
        }

        Ok(self.respond(record.status, &record.transaction_id, None))
    }

    /// Abandon a transaction.
    ///
    /// Unknown transactions are acknowledged as aborted. The staged storage
    /// mutation is left in place.
    pub async fn abort(&self, request: &DecisionRequest) -> Result<TransactionResponse> {
        require("transaction_id", &request.transaction_id)?;
        require("coordinator_id", &request.coordinator_id)?;

        let mut transactions = self.transactions.write().await;
        let Some(record) = transactions.get_mut(&request.transaction_id) else {
            tracing::debug!(
                "Abort for unknown transaction {} from {}",
                request.transaction_id,
                request.coordinator_id
            );
            return Ok(self.respond(
                TransactionStatus::Aborted,
                &request.transaction_id,
                Some("transaction not found on this node; nothing to abort".into()),
            ));
        };

        match record.status {
            TransactionStatus::Prepared => {
                record.status = TransactionStatus::Aborted;
                tracing::debug!("Transaction {} aborted", record.transaction_id);
            }
            TransactionStatus::Aborted => {}
            TransactionStatus::Committed => {
                tracing::warn!(
                    "Abort for already committed transaction {} from {} ignored",
                    record.transaction_id,
                    request.coordinator_id
                );
            }
        }

        Ok(self.respond(record.status, &record.transaction_id, None))
    }

    /// Snapshot of a single transaction
    pub async fn get(&self, transaction_id: &str) -> Option<Transaction> {
        self.transactions.read().await.get(transaction_id).cloned()
    }

    /// Count transactions by status
    pub async fn counts(&self) -> TransactionCounts {
        let transactions = self.transactions.read().await;
        let mut counts = TransactionCounts::default();
        for txn in transactions.values() {
            match txn.status {
                TransactionStatus::Prepared => counts.prepared += 1,
                TransactionStatus::Committed => counts.committed += 1,
                TransactionStatus::Aborted => counts.aborted += 1,
            }
        }
        counts
    }

    fn respond(
        &self,
        status: TransactionStatus,
        transaction_id: &str,
        message: Option<String>,
    ) -> TransactionResponse {
        TransactionResponse {
            status,
            transaction_id: transaction_id.to_string(),
            server_id: self.node_id.clone(),
            message,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn new_handler() -> (TransactionHandler, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (TransactionHandler::new("node-b".to_string(), storage.clone()), storage)
    }

    fn prepare_request(txn: &str, repo: &str) -> PrepareRequest {
        PrepareRequest {
            transaction_id: txn.to_string(),
            coordinator_id: "node-a".to_string(),
            payload: Some(WriteRequest::new(repo, "create")),
        }
    }

    fn decision(txn: &str) -> DecisionRequest {
        DecisionRequest {
            transaction_id: txn.to_string(),
            coordinator_id: "node-a".to_string(),
        }
    }

    #[tokio::test]
    async fn test_prepare_stages_and_records() {
        let (handler, storage) = new_handler();

        let response = handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Prepared);
        assert_eq!(response.server_id, "node-b");
        assert_eq!(response.transaction_id, "t1");

        let repo = RepoId::parse("alice/proj").unwrap();
        assert!(storage.exists(&repo).await.unwrap());

        let txn = handler.get("t1").await.unwrap();
        assert_eq!(txn.coordinator_id, "node-a");
        assert_eq!(txn.payload.repo_id, "alice/proj");
    }

    #[tokio::test]
    async fn test_prepare_validation() {
        let (handler, storage) = new_handler();

        let missing_txn = prepare_request("", "alice/proj");
        assert!(matches!(handler.prepare(missing_txn).await, Err(Error::Validation(_))));

        let mut missing_coord = prepare_request("t1", "alice/proj");
        missing_coord.coordinator_id.clear();
        assert!(matches!(handler.prepare(missing_coord).await, Err(Error::Validation(_))));

        let mut missing_payload = prepare_request("t1", "alice/proj");
        missing_payload.payload = None;
        assert!(matches!(handler.prepare(missing_payload).await, Err(Error::Validation(_))));

        assert!(matches!(
            handler.prepare(prepare_request("t1", "")).await,
            Err(Error::Validation(_))
        ));

        // Failed prepares leave no trace
        assert!(handler.get("t1").await.is_none());
        assert_eq!(storage.creates(), 0);
    }

    #[tokio::test]
    async fn test_prepare_rejects_malformed_repo_id() {
        let (handler, _) = new_handler();
        assert!(matches!(
            handler.prepare(prepare_request("t1", "not-a-repo")).await,
            Err(Error::InvalidRepoId(_))
        ));
        assert!(handler.get("t1").await.is_none());
    }

    #[tokio::test]
    async fn test_prepare_twice_is_idempotent() {
        let (handler, storage) = new_handler();

        handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();
        let again = handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();

        assert_eq!(again.status, TransactionStatus::Prepared);
        assert_eq!(storage.creates(), 1);
        assert_eq!(handler.counts().await.prepared, 1);
    }

    #[tokio::test]
    async fn test_prepare_after_commit_keeps_status() {
        let (handler, _) = new_handler();

        handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();
        handler.commit(&decision("t1")).await.unwrap();
        let again = handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();
        assert_eq!(again.status, TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_commit_unknown_is_not_found() {
        let (handler, _) = new_handler();
        assert!(matches!(
            handler.commit(&decision("never-seen")).await,
            Err(Error::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_unknown_succeeds() {
        let (handler, _) = new_handler();
        let response = handler.abort(&decision("never-seen")).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Aborted);
        assert!(response.message.is_some());
        // Nothing is recorded for it
        assert!(handler.get("never-seen").await.is_none());
    }

    #[tokio::test]
    async fn test_commit_then_repeat() {
        let (handler, _) = new_handler();
        handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();

        assert_eq!(handler.commit(&decision("t1")).await.unwrap().status, TransactionStatus::Committed);
        assert_eq!(handler.commit(&decision("t1")).await.unwrap().status, TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_terminal_states_never_revert() {
        let (handler, _) = new_handler();

        handler.prepare(prepare_request("c", "alice/proj")).await.unwrap();
        handler.commit(&decision("c")).await.unwrap();
        let response = handler.abort(&decision("c")).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Committed);
        assert_eq!(handler.get("c").await.unwrap().status, TransactionStatus::Committed);

        handler.prepare(prepare_request("a", "alice/proj")).await.unwrap();
        handler.abort(&decision("a")).await.unwrap();
        let response = handler.commit(&decision("a")).await.unwrap();
        assert_eq!(response.status, TransactionStatus::Aborted);
        assert_eq!(handler.get("a").await.unwrap().status, TransactionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_abort_keeps_staged_repository() {
        let (handler, storage) = new_handler();
        handler.prepare(prepare_request("t1", "alice/proj")).await.unwrap();
        handler.abort(&decision("t1")).await.unwrap();

        assert!(storage.exists(&RepoId::parse("alice/proj").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_decisions_require_ids() {
        let (handler, _) = new_handler();
        let mut request = decision("t1");
        request.coordinator_id.clear();

        assert!(matches!(handler.commit(&request).await, Err(Error::Validation(_))));
        assert!(matches!(handler.abort(&request).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_prepares_for_same_repository() {
        let (handler, storage) = new_handler();
        let handler = Arc::new(handler);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler
                        .prepare(prepare_request(&format!("t{}", i), "alice/proj"))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(storage.creates(), 1);
        assert_eq!(handler.counts().await, TransactionCounts { prepared: 16, committed: 0, aborted: 0 });
    }
}
