use std::fs::OpenOptions;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use replikv::network::PeerRegistry;
use replikv::{Node, NodeConfig};

#[derive(Parser)]
#[command(name = "replikv")]
#[command(about = "A replicated key-value store driven by Raft consensus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a cluster member
    Node {
        /// Unique non-zero ID for this node
        #[arg(short, long)]
        id: Option<u64>,

        /// Transport (gRPC) address to listen on
        #[arg(short, long)]
        listen: Option<String>,

        /// Client HTTP API address
        #[arg(long)]
        http: Option<String>,

        /// Comma-separated list of other voters (id=address)
        #[arg(short, long)]
        peers: Option<String>,

        /// JSON config file; flags override its values
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Query a running node over its HTTP API
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
}

#[derive(Subcommand)]
enum AdminCmd {
    /// Show node status (host:port of the HTTP API)
    Status {
        #[arg(long)]
        http: String,
    },
    /// Dump Prometheus metrics
    Metrics {
        #[arg(long)]
        http: String,
    },
}

fn init_logging() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("REPLIKV_LOG_FILE") {
        // Plain text to a file through env_logger; no tracing subscriber.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {path}"))?;
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(file)))
            .try_init()?;
        return Ok(());
    }

    LogTracer::init()?;
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

async fn http_get(host_port: &str, path: &str) -> anyhow::Result<String> {
    let uri: hyper::Uri = format!("http://{host_port}{path}")
        .parse()
        .with_context(|| format!("invalid address {host_port}"))?;
    let response = hyper::Client::new().get(uri).await?;
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await?;
    let body = String::from_utf8_lossy(&body).into_owned();
    if !status.is_success() {
        anyhow::bail!("{} returned {}: {}", path, status, body);
    }
    Ok(body)
}

fn node_config(
    id: Option<u64>,
    listen: Option<String>,
    http: Option<String>,
    peers: Option<String>,
    config: Option<String>,
) -> anyhow::Result<NodeConfig> {
    let mut cfg = match config {
        Some(path) => NodeConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => NodeConfig::default(),
    };
    if let Some(id) = id {
        cfg.node_id = id;
    }
    if let Some(listen) = listen {
        cfg.listen_addr = listen;
    }
    if http.is_some() {
        cfg.http_addr = http;
    }
    if let Some(peers) = peers {
        cfg.peers = PeerRegistry::parse(&peers)?;
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Node {
            id,
            listen,
            http,
            peers,
            config,
        } => {
            let cfg = node_config(id, listen, http, peers, config)?;
            let node = Node::start(cfg).await?;
            info!(
                "Node {} running (transport {}, http {:?}); Ctrl-C to stop",
                node.id(),
                node.raft_addr(),
                node.http_addr()
            );

            tokio::signal::ctrl_c().await?;
            info!("Received Ctrl-C");
            node.shutdown().await?;
        }
        Command::Admin { cmd } => {
            let body = match cmd {
                AdminCmd::Status { http } => http_get(&http, "/health").await?,
                AdminCmd::Metrics { http } => http_get(&http, "/metrics").await?,
            };
            println!("{}", body);
        }
    }

    Ok(())
}
