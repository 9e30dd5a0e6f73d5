//! # Peer Mesh
//!
//! Full-mesh WebSocket clustering. Every node keeps one socket to every other
//! node, sends JSON messages to any subset of them, and hears about links
//! going up and down.
//!
//! ## Modules
//! - `cluster` - Peer registry, health sweep and message fan-out
//! - `remote` - Connection state machine for one remote node
//! - `local` - The node itself as a loop-back peer
//! - `arbitration` - Which of two duplicate sockets survives
//! - `upgrade` - Authentication of inbound upgrades and the axum router
//! - `settings` - Cluster settings and their defaults
//!
//! ## Example
//! ```no_run
//! use peer_mesh::{ClusterSettings, PeerCluster, PeerDescriptor, Targets};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = PeerCluster::new(ClusterSettings::new("server1", "ws://10.0.0.1:8900/"))?;
//! cluster.add_peer(PeerDescriptor::new("server2", "ws://10.0.0.2:8900/", "psk"))?;
//!
//! let listener = tokio::net::TcpListener::bind("10.0.0.1:8900").await?;
//! let app = cluster.router();
//! tokio::spawn(async move { axum::serve(listener, app).await });
//! cluster.start();
//!
//! cluster.send(&Arc::new(serde_json::json!({"from": "server1"})), Targets::Remotes)?;
//! # Ok(())
//! # }
//! ```

pub mod arbitration;
pub mod cluster;
pub mod local;
pub mod peer;
pub mod remote;
pub mod settings;
pub mod upgrade;

mod connection;

pub use arbitration::keep_existing;
pub use cluster::{PeerCluster, Target, Targets};
pub use local::LocalPeer;
pub use peer::{ClusterEvent, PeerEvent, PeerRef};
pub use remote::RemotePeer;
pub use settings::ClusterSettings;
pub use upgrade::{UpgradeOutcome, UpgradeRequest, router};

pub use mesh_common::{Message, MeshError, PeerDescriptor, PeerStatus};
