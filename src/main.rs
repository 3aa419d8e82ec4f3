//! QuorumRepo - Synchronous Quorum Replication for Repository Hosts
//!
//! Node binary: serves the repository API and the peer replication
//! endpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quorumrepo::api::{AppState, HttpServer};
use quorumrepo::config::QuorumRepoConfig;
use quorumrepo::error::Result;
use quorumrepo::storage::FsStorage;

/// QuorumRepo - Synchronous Quorum Replication for Repository Hosts
#[derive(Parser)]
#[command(name = "quorumrepo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "QUORUMREPO_CONFIG", default_value = "quorumrepo.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "QUORUMREPO_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start(StartArgs),

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "quorumrepo.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "node-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

/// Overrides applied on top of the configuration file
#[derive(clap::Args)]
struct StartArgs {
    /// Node ID
    #[arg(long, env = "QUORUMREPO_NODE_ID")]
    node_id: Option<String>,

    /// HTTP bind address
    #[arg(long, env = "QUORUMREPO_BIND")]
    bind: Option<String>,

    /// Repository root directory
    #[arg(long, env = "QUORUMREPO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Peer base URLs, comma separated
    #[arg(long, env = "QUORUMREPO_PEERS", value_delimiter = ',')]
    peers: Option<Vec<String>>,

    /// Per-call peer timeout in milliseconds
    #[arg(long, env = "QUORUMREPO_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(cli.config, cli.log_level, args).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file (if present) and apply command line overrides
fn load_config(config_path: &Path, args: StartArgs) -> Result<QuorumRepoConfig> {
    let mut config = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)?;
        toml::from_str::<QuorumRepoConfig>(&content)?
    } else {
        let node_id = args.node_id.clone().ok_or_else(|| {
            quorumrepo::Error::Config(format!(
                "{} not found and no --node-id given",
                config_path.display()
            ))
        })?;
        QuorumRepoConfig::new(node_id, PathBuf::from("/var/lib/quorumrepo"))
    };

    if let Some(node_id) = args.node_id {
        config.node.id = node_id;
    }
    if let Some(bind) = args.bind {
        config.api.bind_address = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(peers) = args.peers {
        config.cluster.peers = peers.into_iter().filter(|p| !p.trim().is_empty()).collect();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.cluster.call_timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

/// Start the node
async fn run_start(config_path: PathBuf, log_level: Option<String>, args: StartArgs) -> Result<()> {
    let config = match load_config(&config_path, args) {
        Ok(c) => c,
        Err(e) => {
            init_logging(log_level.as_deref().unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };

    init_logging(
        log_level.as_deref().unwrap_or(&config.logging.level),
        &config.logging.format,
    );
    tracing::info!("Starting QuorumRepo node {}", config.node.id);

    let storage = match FsStorage::new(config.data_dir().clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open repository root {:?}: {}", config.data_dir(), e);
            return Err(e);
        }
    };
    tracing::info!("Serving repositories from {}", storage.root().display());

    let state = Arc::new(AppState::from_config(&config, storage)?);
    tracing::info!(
        "Cluster of {} nodes, {} peer confirmations per write, {} ms per call",
        config.cluster_size(),
        config.quorum_size(),
        config.cluster.call_timeout_ms
    );
    for peer in &config.cluster.peers {
        tracing::info!("  peer: {}", peer);
    }

    let server = HttpServer::new(config.api.clone(), state);

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                tracing::error!("HTTP API error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!("Node {} stopped; in-flight transaction records are discarded", config.node.id);
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(r#"# QuorumRepo Configuration
# Generated configuration file

[node]
id = "{node_id}"
data_dir = "/var/lib/quorumrepo/{node_id}"

[cluster]
peers = []
# peers = ["http://node-2.example.com:8080", "http://node-3.example.com:8080"]
call_timeout_ms = 5000

[api]
bind_address = "0.0.0.0:8080"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to list the other nodes of the cluster.");
    println!("Then start with: quorumrepo --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match QuorumRepoConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.api.bind_address);
            println!("  Peers: {}", config.cluster.peers.len());
            println!("  Quorum Size: {}", config.quorum_size());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = QuorumRepoConfig::from_file(&config_path)?;

    println!("QuorumRepo Node Information");
    println!("===========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Bind Address:     {}", config.api.bind_address);
    println!("Data Directory:   {}", config.data_dir().display());
    println!();
    println!("Cluster Configuration:");
    println!("  Peers:          {:?}", config.cluster.peers);
    println!("  Cluster Size:   {}", config.cluster_size());
    println!("  Quorum Size:    {} peers", config.quorum_size());
    println!("  Call Timeout:   {} ms", config.cluster.call_timeout_ms);

    Ok(())
}
