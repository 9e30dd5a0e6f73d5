//! Application state and shared resources.

use peer_mesh::PeerCluster;
use std::sync::Arc;

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// The cluster this node belongs to
    pub cluster: PeerCluster,
}

impl AppState {
    pub fn new(config: AppConfig, cluster: PeerCluster) -> Self {
        Self {
            config: Arc::new(config),
            cluster,
        }
    }

    /// Number of remote peers with an active link, and the total
    pub fn connected_peers(&self) -> (usize, usize) {
        let peers = self.cluster.peers();
        let connected = peers.iter().filter(|peer| peer.is_connected()).count();
        (connected, peers.len())
    }
}
