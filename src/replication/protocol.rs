//! Replication Protocol
//!
//! Request and response bodies exchanged between a coordinator and the
//! transaction handlers on its peers.

use serde::{Deserialize, Serialize};

/// A write to be replicated across the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Repository identifier (`owner/name`)
    #[serde(default)]
    pub repo_id: String,
    /// Ref being updated, if any
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    /// Commit the ref points at, if any
    #[serde(default)]
    pub commit: String,
    /// Operation name (`create`, `push`, ...)
    #[serde(default)]
    pub operation: String,
    /// Any additional caller-supplied fields, carried verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WriteRequest {
    pub fn new(repo_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            git_ref: String::new(),
            commit: String::new(),
            operation: operation.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a ref update to the write
    pub fn with_ref(mut self, git_ref: impl Into<String>, commit: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self.commit = commit.into();
        self
    }
}

/// Phase 1 request: stage the write under `transaction_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub coordinator_id: String,
    #[serde(default)]
    pub payload: Option<WriteRequest>,
}

/// Phase 2 request: commit or abort a previously prepared transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub coordinator_id: String,
}

/// Lifecycle state of a transaction on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Prepared,
    Committed,
    Aborted,
}

impl TransactionStatus {
    /// Committed and aborted transactions never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Prepared)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Prepared => write!(f, "prepared"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Reply from a peer's transaction handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub status: TransactionStatus,
    pub transaction_id: String,
    pub server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one `replicate` call, returned to the local write path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationResult {
    pub success: bool,
    pub peers_confirmed: usize,
    pub peers_required: usize,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_request_keeps_extra_fields() {
        let json = serde_json::json!({
            "repo_id": "alice/proj",
            "ref": "refs/heads/main",
            "commit": "3f2a9c",
            "operation": "push",
            "pusher": "alice",
        });

        let write: WriteRequest = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(write.git_ref, "refs/heads/main");
        assert_eq!(write.extra.get("pusher"), Some(&serde_json::json!("alice")));
        assert_eq!(serde_json::to_value(&write).unwrap(), json);
    }

    #[test]
    fn test_missing_fields_deserialize_empty() {
        let prepare: PrepareRequest = serde_json::from_str("{}").unwrap();
        assert!(prepare.transaction_id.is_empty());
        assert!(prepare.payload.is_none());

        let prepare: PrepareRequest =
            serde_json::from_str(r#"{"transaction_id":"t","coordinator_id":"a","payload":{}}"#).unwrap();
        assert!(prepare.payload.unwrap().repo_id.is_empty());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&TransactionStatus::Committed).unwrap(), "\"committed\"");
        assert!(TransactionStatus::Aborted.is_terminal());
        assert!(!TransactionStatus::Prepared.is_terminal());
    }
}
