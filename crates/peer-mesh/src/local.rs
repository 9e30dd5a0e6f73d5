//! The cluster's own node, modelled as a peer without a transport.

use mesh_common::Message;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::peer::{ClusterEvent, PeerCore, PeerEvent};

/// Local member of the cluster; sent messages come straight back as received
#[derive(Debug)]
pub struct LocalPeer {
    core: PeerCore,
    origin: String,
}

impl LocalPeer {
    pub(crate) fn new(
        peer_id: String,
        origin: String,
        cluster_events: Option<broadcast::Sender<ClusterEvent>>,
    ) -> Self {
        Self {
            core: PeerCore::new(peer_id, cluster_events),
            origin,
        }
    }

    pub fn peer_id(&self) -> &str {
        self.core.peer_id()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_connected(&self) -> bool {
        !self.core.is_stopping()
    }

    pub fn is_stopping(&self) -> bool {
        self.core.is_stopping()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.core.subscribe()
    }

    /// Deliver `message` to subscribers in this call, sharing the caller's allocation
    pub fn send(&self, message: Arc<Message>) {
        if self.core.is_stopping() {
            return;
        }

        self.core.emit(PeerEvent::Receive(message));
    }

    /// Returns true if the peer was already stopped
    pub(crate) fn stop(&self) -> bool {
        self.core.stop()
    }
}
