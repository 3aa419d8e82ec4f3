//! QuorumRepo - Synchronous Quorum Replication for Repository Hosts
//!
//! Coordinates repository writes across a small, fixed set of peer nodes so
//! that a write is acknowledged only once a quorum of peers has staged and
//! finalized it.
//!
//! # Architecture
//!
//! Any node may accept a write. It applies the write locally, then acts as
//! coordinator for a two-phase commit: a prepare is sent to every peer in
//! parallel, and if enough peers prepared the coordinator commits on them,
//! otherwise it aborts. Every node also runs a transaction handler that
//! serves the peer side of the protocol from an in-memory table.
//!
//! # Known gaps
//!
//! - Concurrent writes to the same repository are not serialized.
//! - Aborts do not undo the staged storage mutation on peers, and a failed
//!   replication does not undo the coordinator's local write.
//! - The transaction table is volatile and never pruned.

pub mod config;
pub mod error;
pub mod storage;
pub mod replication;
pub mod network;
pub mod api;

pub use config::QuorumRepoConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::QuorumRepoConfig;
    pub use crate::error::{Error, Result};
    pub use crate::storage::{RepoId, RepoStorage, FsStorage, MemoryStorage};
    pub use crate::replication::{
        ReplicationCoordinator, ReplicationResult, TransactionHandler, WriteRequest,
    };
    pub use crate::network::{PeerTransport, HttpPeerClient};
    pub use crate::api::{AppState, HttpServer};
}
