//! QuorumRepo Error Types

use thiserror::Error;

/// Result type alias for QuorumRepo operations
pub type Result<T> = std::result::Result<T, Error>;

/// QuorumRepo error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Request errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid repository id '{0}': expected owner/name")]
    InvalidRepoId(String),

    // Storage errors
    #[error("Repository already exists: {0}")]
    RepoAlreadyExists(String),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Replication errors
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Quorum not reached: {reached}/{required}")]
    QuorumNotReached { reached: usize, required: usize },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Peer {address} rejected request with status {status}: {body}")]
    PeerRejected {
        address: String,
        status: u16,
        body: String,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::QuorumNotReached { .. }
                | Error::Network(_)
        )
    }

    /// Short machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidRepoId(_) => "INVALID_REPO_ID",
            Error::RepoAlreadyExists(_) => "REPO_EXISTS",
            Error::RepoNotFound(_) => "REPO_NOT_FOUND",
            Error::Storage(_) | Error::Io(_) => "STORAGE_ERROR",
            Error::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Error::QuorumNotReached { .. } => "QUORUM_NOT_REACHED",
            Error::Network(_)
            | Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout(_)
            | Error::PeerRejected { .. } => "PEER_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
