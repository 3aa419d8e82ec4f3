//! HTTP API Module
//!
//! Provides the REST API for repository writes, the peer-facing
//! replication endpoints and node status.

mod http;

pub use http::{AppState, ErrorResponse, HealthResponse, HttpServer, RepoListResponse, StatusResponse, WriteResponse};
