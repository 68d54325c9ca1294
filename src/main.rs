//! peerstore -- replicated users/bids key-value node.
//!
//! Every startup is a recovery: the node starts serving, takes part in an
//! election, pulls the leader's snapshot if it is a follower, and then runs
//! the heartbeat loops.  SIGTERM/SIGINT stop accepting connections and wait
//! for in-flight requests with a timeout; there is no leadership handoff.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use peerstore::clock::SystemClock;
use peerstore::cluster::{heartbeat, HttpTransport};
use peerstore::config::LoggingConfig;

/// Command-line arguments for the peerstore node.
#[derive(Parser, Debug)]
#[command(
    name = "peerstore",
    version,
    about = "Leader-elected, replicated users/bids key-value node"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "peerstore.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    /// Address peers use to reach this node (host:port).
    #[arg(long, env = "NODE_ADDRESS")]
    address: Option<String>,

    /// Every node in the cluster, comma separated.  May include this node.
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    peers: Option<Vec<String>>,

    /// Directory holding users.json and bids.json.
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = peerstore::config::load_config(&cli.config)?;
    if let Some(address) = cli.address {
        config.node.address = address;
    }
    if let Some(peers) = cli.peers {
        config.cluster.peers = peers;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    init_logging(&config.logging);
    info!("Loaded configuration from {}", cli.config);
    config.validate()?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        peerstore::metrics::init_metrics()?;
        peerstore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let transport = Arc::new(HttpTransport::new()?);
    let state = Arc::new(peerstore::AppState::new(
        config,
        transport,
        Arc::new(SystemClock),
    )?);
    info!(
        name = state.config.node.display_name(),
        address = %state.node.address(),
        peers = ?state.node.peers(),
        data_dir = %state.store.dir().display(),
        "Node initialized"
    );

    let app = peerstore::server::app(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("peerstore listening on {}", bind_addr);

    // Serve before electing: peers poll /election while we do the same.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let startup = {
        let state = state.clone();
        tokio::spawn(async move {
            let leader = state.coordinator.bootstrap().await;
            info!(%leader, "Startup complete");
            heartbeat::spawn(state.node.clone())
        })
    };

    tokio::select! {
        joined = &mut server => {
            startup.abort();
            joined??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    if startup.is_finished() {
        if let Ok(tasks) = startup.await {
            tasks.abort();
        }
    } else {
        startup.abort();
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            "In-flight requests still running after {}s, exiting",
            shutdown_timeout.as_secs()
        ),
    }

    info!("peerstore shut down");
    Ok(())
}

/// `RUST_LOG` wins over `logging.level`; `logging.format = json` selects the
/// JSON formatter.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
