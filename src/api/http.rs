//! HTTP API Server
//!
//! Client-facing repository writes, the peer-facing replication endpoints,
//! and health/status reporting.

use std::sync::Arc;
use std::time::Instant;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ApiConfig, QuorumRepoConfig};
use crate::error::{Error, Result};
use crate::network::{HttpPeerClient, PeerTransport, REPLICATION_PATH};
use crate::replication::{
    DecisionRequest, PrepareRequest, ReplicationConfig, ReplicationCoordinator,
    ReplicationResult, TransactionCounts, TransactionHandler, WriteRequest,
};
use crate::storage::{RepoId, RepoStorage};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// Local repository storage
    pub storage: Arc<dyn RepoStorage>,
    /// Peer side of the replication protocol
    pub transactions: Arc<TransactionHandler>,
    /// Coordinator for writes accepted by this node
    pub coordinator: Arc<ReplicationCoordinator>,
    /// Process start time
    pub started_at: Instant,
}

impl AppState {
    /// Wire a node from its parts
    pub fn new(
        node_id: String,
        peers: Vec<String>,
        storage: Arc<dyn RepoStorage>,
        transport: Arc<dyn PeerTransport>,
        replication: ReplicationConfig,
    ) -> Self {
        let transactions = Arc::new(TransactionHandler::new(node_id.clone(), Arc::clone(&storage)));
        let coordinator = Arc::new(ReplicationCoordinator::new(
            node_id.clone(),
            peers,
            transport,
            replication,
        ));

        Self {
            node_id,
            storage,
            transactions,
            coordinator,
            started_at: Instant::now(),
        }
    }

    /// Wire a node from configuration, talking to peers over HTTP
    pub fn from_config(config: &QuorumRepoConfig, storage: Arc<dyn RepoStorage>) -> Result<Self> {
        let transport = Arc::new(HttpPeerClient::new(config.call_timeout())?);
        Ok(Self::new(
            config.node.id.clone(),
            config.cluster.peers.clone(),
            storage,
            transport,
            ReplicationConfig::from(config),
        ))
    }
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            // Repository writes and reads
            .route("/api/repos", get(handle_list_repos).post(handle_create_repo))
            .route("/api/repos/:owner/:name", get(handle_get_repo))
            .route("/api/repos/:owner/:name/refs", post(handle_push))
            // Peer-facing replication
            .route(&format!("{}/prepare", REPLICATION_PATH), post(handle_prepare))
            .route(&format!("{}/commit", REPLICATION_PATH), post(handle_commit))
            .route(&format!("{}/abort", REPLICATION_PATH), post(handle_abort))
            .route(
                &format!("{}/transactions/:transaction_id", REPLICATION_PATH),
                get(handle_get_transaction),
            )
            // Status and info
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the configured address and serve until the process stops
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))
    }
}

// ============ Request/Response Types ============

/// Ref update request
#[derive(Debug, Deserialize, Serialize)]
pub struct PushRequest {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub commit: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Write response
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    pub repo_id: String,
    pub transaction_id: String,
    pub peers_confirmed: usize,
    pub peers_required: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Single repository response
#[derive(Debug, Serialize, Deserialize)]
pub struct RepoResponse {
    pub repo_id: String,
    pub exists: bool,
}

/// Repository listing
#[derive(Debug, Serialize, Deserialize)]
pub struct RepoListResponse {
    pub repos: Vec<String>,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub peers: Vec<String>,
    pub cluster_size: usize,
    pub quorum_size: usize,
    pub uptime_seconds: u64,
    pub transactions: TransactionCounts,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_create_repo(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<WriteRequest>,
) -> Response {
    if req.operation.is_empty() {
        req.operation = "create".to_string();
    }

    let repo = match RepoId::parse(&req.repo_id) {
        Ok(repo) => repo,
        Err(e) => return error_response(e),
    };

    // Local write first; replication failure does not undo it
    if let Err(e) = state.storage.create(&repo).await {
        return error_response(e);
    }

    let result = state.coordinator.replicate(&req).await;
    write_response(&repo, result, StatusCode::CREATED)
}

async fn handle_push(
    State(state): State<Arc<AppState>>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<PushRequest>,
) -> Response {
    let repo = match RepoId::parse(&format!("{}/{}", owner, name)) {
        Ok(repo) => repo,
        Err(e) => return error_response(e),
    };

    if req.git_ref.is_empty() || req.commit.is_empty() {
        return error_response(Error::Validation("ref and commit are required".into()));
    }

    match state.storage.exists(&repo).await {
        Ok(true) => {}
        Ok(false) => return error_response(Error::RepoNotFound(repo.to_string())),
        Err(e) => return error_response(e),
    }

    let mut write = WriteRequest::new(repo.to_string(), "push").with_ref(req.git_ref, req.commit);
    write.extra = req.extra;

    let result = state.coordinator.replicate(&write).await;
    write_response(&repo, result, StatusCode::OK)
}

async fn handle_list_repos(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.list().await {
        Ok(repos) => Json(RepoListResponse {
            repos: repos.iter().map(|r| r.to_string()).collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_get_repo(
    State(state): State<Arc<AppState>>,
    Path((owner, name)): Path<(String, String)>,
) -> Response {
    let repo = match RepoId::parse(&format!("{}/{}", owner, name)) {
        Ok(repo) => repo,
        Err(e) => return error_response(e),
    };

    match state.storage.exists(&repo).await {
        Ok(true) => Json(RepoResponse {
            repo_id: repo.to_string(),
            exists: true,
        })
        .into_response(),
        Ok(false) => error_response(Error::RepoNotFound(repo.to_string())),
        Err(e) => error_response(e),
    }
}

async fn handle_prepare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrepareRequest>,
) -> Response {
    match state.transactions.prepare(req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_commit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecisionRequest>,
) -> Response {
    match state.transactions.commit(&req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_abort(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecisionRequest>,
) -> Response {
    match state.transactions.abort(&req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Response {
    match state.transactions.get(&transaction_id).await {
        Some(txn) => Json(txn).into_response(),
        None => error_response(Error::TransactionNotFound(transaction_id)),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        peers: state.coordinator.peers().to_vec(),
        cluster_size: state.coordinator.cluster_size(),
        quorum_size: state.coordinator.quorum_size(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        transactions: state.transactions.counts().await,
    })
}

// ============ Helpers ============

fn write_response(repo: &RepoId, result: ReplicationResult, success_status: StatusCode) -> Response {
    let status = if result.success {
        success_status
    } else {
        tracing::error!(
            "Replication of {} failed ({}/{} peers); local write kept",
            repo,
            result.peers_confirmed,
            result.peers_required
        );
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(WriteResponse {
            success: result.success,
            repo_id: repo.to_string(),
            transaction_id: result.transaction_id,
            peers_confirmed: result.peers_confirmed,
            peers_required: result.peers_required,
            message: result.error,
        }),
    )
        .into_response()
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::InvalidRepoId(_) => StatusCode::BAD_REQUEST,
        Error::TransactionNotFound(_) | Error::RepoNotFound(_) => StatusCode::NOT_FOUND,
        Error::RepoAlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = error_status(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
        .into_response()
}
