//! QuorumCtl - Command line tool for QuorumRepo nodes
//!
//! Usage:
//!   quorumctl status                       - Show node status
//!   quorumctl health                       - Check node health
//!   quorumctl repos list                   - List repositories
//!   quorumctl repos create alice/proj      - Create and replicate a repository
//!   quorumctl repos push alice/proj --ref refs/heads/main --commit 3f2a9c
//!   quorumctl txn show <transaction-id>    - Show a transaction record

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

use quorumrepo::api::{ErrorResponse, HealthResponse, RepoListResponse, StatusResponse, WriteResponse};
use quorumrepo::replication::Transaction;

/// QuorumRepo Control Tool
#[derive(Parser)]
#[command(name = "quorumctl")]
#[command(about = "Control and inspect QuorumRepo nodes", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "quorumrepo.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long, env = "QUORUMCTL_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status of the node
    Status,
    /// Check node health
    Health,
    /// Repository operations
    Repos {
        #[command(subcommand)]
        action: RepoCommand,
    },
    /// Transaction inspection
    Txn {
        #[command(subcommand)]
        action: TxnCommand,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// List repositories on the node
    List,
    /// Create a repository (owner/name) and replicate it
    Create { repo: String },
    /// Replicate a ref update
    Push {
        repo: String,
        #[arg(long = "ref")]
        git_ref: String,
        #[arg(long)]
        commit: String,
    },
}

#[derive(Subcommand)]
enum TxnCommand {
    /// Show a transaction record held by the node
    Show { transaction_id: String },
}

// ============ Config (minimal view) ============

#[derive(Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiSection,
}

#[derive(Deserialize)]
struct ApiSection {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = resolve_endpoint(&cli);

    let result = match &cli.command {
        Commands::Status => show_status(&endpoint).await,
        Commands::Health => show_health(&endpoint).await,
        Commands::Repos { action } => match action {
            RepoCommand::List => list_repos(&endpoint).await,
            RepoCommand::Create { repo } => create_repo(&endpoint, repo).await,
            RepoCommand::Push { repo, git_ref, commit } => push(&endpoint, repo, git_ref, commit).await,
        },
        Commands::Txn { action } => match action {
            TxnCommand::Show { transaction_id } => show_transaction(&endpoint, transaction_id).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Endpoint from --endpoint, else from the config file's bind address
fn resolve_endpoint(cli: &Cli) -> String {
    if let Some(endpoint) = &cli.endpoint {
        return endpoint.trim_end_matches('/').to_string();
    }

    let addr = std::fs::read_to_string(&cli.config)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    // Convert bind address to localhost if it's 0.0.0.0
    if let Some(port) = addr.strip_prefix("0.0.0.0:") {
        format!("http://127.0.0.1:{}", port)
    } else {
        format!("http://{}", addr)
    }
}

/// Turn a non-success response into an error carrying the server's message
async fn api_error(response: reqwest::Response) -> Box<dyn std::error::Error> {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => format!("API error {}: {} ({})", status, body.error, body.code).into(),
        Err(_) => format!("API error: {}", status).into(),
    }
}

// ============ Commands ============

async fn show_status(endpoint: &str) -> CmdResult {
    let response = reqwest::get(format!("{}/status", endpoint)).await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let status: StatusResponse = response.json().await?;

    println!();
    println!("Node Status (quorumctl v{})", env!("CARGO_PKG_VERSION"));
    println!("===========");
    println!();
    println!("Node ID:      {}", status.node_id);
    println!("Cluster Size: {}", status.cluster_size);
    println!("Quorum:       {} peer confirmations", status.quorum_size);
    println!("Uptime:       {}s", status.uptime_seconds);
    println!();
    println!("Peers:");
    if status.peers.is_empty() {
        println!("  (none)");
    }
    for peer in &status.peers {
        println!("  {}", peer);
    }
    println!();
    println!("Transactions: {} prepared, {} committed, {} aborted",
        status.transactions.prepared,
        status.transactions.committed,
        status.transactions.aborted
    );
    println!();

    Ok(())
}

async fn show_health(endpoint: &str) -> CmdResult {
    let response = reqwest::get(format!("{}/health", endpoint)).await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let health: HealthResponse = response.json().await?;

    if health.healthy {
        println!("\x1b[32m✓\x1b[0m {} is healthy", health.node_id);
    } else {
        println!("\x1b[31m✗\x1b[0m {} is unhealthy", health.node_id);
    }
    Ok(())
}

async fn list_repos(endpoint: &str) -> CmdResult {
    let response = reqwest::get(format!("{}/api/repos", endpoint)).await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let list: RepoListResponse = response.json().await?;

    if list.repos.is_empty() {
        println!("No repositories");
    }
    for repo in &list.repos {
        println!("{}", repo);
    }
    Ok(())
}

async fn create_repo(endpoint: &str, repo: &str) -> CmdResult {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/repos", endpoint))
        .json(&serde_json::json!({ "repo_id": repo, "operation": "create" }))
        .send()
        .await?;

    print_write(response).await
}

async fn push(endpoint: &str, repo: &str, git_ref: &str, commit: &str) -> CmdResult {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/repos/{}/refs", endpoint, repo))
        .json(&serde_json::json!({ "ref": git_ref, "commit": commit }))
        .send()
        .await?;

    print_write(response).await
}

async fn print_write(response: reqwest::Response) -> CmdResult {
    let status = response.status();
    if !status.is_success() && status != reqwest::StatusCode::INTERNAL_SERVER_ERROR {
        return Err(api_error(response).await);
    }

    let write: WriteResponse = response.json().await?;
    if write.success {
        println!(
            "\x1b[32m✓\x1b[0m {} replicated to {} peers (required {}), transaction {}",
            write.repo_id, write.peers_confirmed, write.peers_required, write.transaction_id
        );
        Ok(())
    } else {
        Err(format!(
            "{} was written locally but not replicated: {} of {} peers confirmed ({})",
            write.repo_id,
            write.peers_confirmed,
            write.peers_required,
            write.message.unwrap_or_default()
        )
        .into())
    }
}

async fn show_transaction(endpoint: &str, transaction_id: &str) -> CmdResult {
    let response = reqwest::get(format!(
        "{}/internal/replication/transactions/{}",
        endpoint, transaction_id
    ))
    .await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let txn: Transaction = response.json().await?;

    println!("Transaction:  {}", txn.transaction_id);
    println!("Coordinator:  {}", txn.coordinator_id);
    println!("Status:       {}", txn.status);
    println!("Created:      {}", txn.created_at.to_rfc3339());
    println!("Repository:   {}", txn.payload.repo_id);
    println!("Operation:    {}", txn.payload.operation);
    if !txn.payload.git_ref.is_empty() {
        println!("Ref:          {} -> {}", txn.payload.git_ref, txn.payload.commit);
    }
    Ok(())
}
