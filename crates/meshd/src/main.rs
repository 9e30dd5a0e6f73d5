//! # meshd - Peer Mesh Node Daemon
//!
//! Runs one member of a full-mesh WebSocket cluster. Serves the cluster's
//! upgrade endpoint next to health checks and an admin API.
//!
//! ## Architecture
//! ```text
//! meshd (server1) ⇄ meshd (server2)
//!        ⇅               ⇅
//!   meshd (server3) ⇄ ...
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use peer_mesh::{ClusterEvent, PeerCluster, PeerEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

/// Peer mesh node daemon
#[derive(Parser, Debug)]
#[command(name = "meshd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/meshd.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// This node's peer ID (overrides config)
    #[arg(long, env = "MESHD_PEER_ID")]
    peer_id: Option<String>,

    /// This node's WebSocket origin URL (overrides config)
    #[arg(long, env = "MESHD_ORIGIN")]
    origin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Environment from .env, if present
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🕸️ Starting meshd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(
        peer_id = %config.cluster.peer_id,
        origin = %config.cluster.origin,
        peers = config.peers.len(),
        "📋 Configuration loaded"
    );

    // Build the cluster and register the configured peers
    let cluster = PeerCluster::new(config.cluster.clone()).context("Invalid cluster settings")?;
    for descriptor in &config.peers {
        cluster
            .add_peer(descriptor.clone())
            .with_context(|| format!("Failed to register peer '{}'", descriptor.peer_id))?;
    }

    tokio::spawn(log_events(cluster.subscribe()));

    // Build router
    let state = AppState::new(config.clone(), cluster.clone());
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 meshd listening on {}", config.listen_addr);

    cluster.start();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cluster.stop();
    info!("👋 meshd shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("🛑 Shutdown signal received");
}

/// Log received messages and link changes for the lifetime of the cluster
async fn log_events(mut events: broadcast::Receiver<ClusterEvent>) {
    loop {
        match events.recv().await {
            Ok(ClusterEvent { peer_id, event }) => match event {
                PeerEvent::Receive(message) => info!(peer = %peer_id, %message, "📨 Message received"),
                PeerEvent::Connected => info!(peer = %peer_id, "🔗 Link up"),
                PeerEvent::Disconnected => warn!(peer = %peer_id, "Link down"),
                PeerEvent::Error(e) => warn!(peer = %peer_id, error = %e, "Peer error"),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
