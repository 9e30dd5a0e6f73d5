//! Peer events and the lifecycle shared by local and remote peers.

use mesh_common::constants::EVENT_CHANNEL_CAPACITY;
use mesh_common::{Message, MeshError, PeerStatus};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use crate::local::LocalPeer;
use crate::remote::RemotePeer;

/// Something that happened on one peer
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A message arrived from this peer
    Receive(Arc<Message>),
    /// A connection became active
    Connected,
    /// The active connection closed
    Disconnected,
    /// A frame could not be decoded; the link stays up
    Error(Arc<MeshError>),
}

/// A peer event re-emitted at cluster scope, tagged with the peer's id
#[derive(Debug, Clone)]
pub struct ClusterEvent {
    pub peer_id: String,
    pub event: PeerEvent,
}

/// Stopping flag and event fan-out common to every peer
#[derive(Debug)]
pub(crate) struct PeerCore {
    peer_id: String,
    stopping: AtomicBool,
    events: broadcast::Sender<PeerEvent>,
    cluster_events: Option<broadcast::Sender<ClusterEvent>>,
}

impl PeerCore {
    pub fn new(peer_id: String, cluster_events: Option<broadcast::Sender<ClusterEvent>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            peer_id,
            stopping: AtomicBool::new(false),
            events,
            cluster_events,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Set the stopping flag, returning its previous value
    pub fn stop(&self) -> bool {
        self.stopping.swap(true, Ordering::AcqRel)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    /// Deliver to peer subscribers, then to the cluster (errors stay peer-local)
    pub fn emit(&self, event: PeerEvent) {
        if let Some(cluster_events) = &self.cluster_events {
            if !matches!(event, PeerEvent::Error(_)) {
                let _ = cluster_events.send(ClusterEvent {
                    peer_id: self.peer_id.clone(),
                    event: event.clone(),
                });
            }
        }

        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// A cluster member: the node itself or one of its remotes
#[derive(Clone)]
pub enum PeerRef {
    Local(Arc<LocalPeer>),
    Remote(Arc<RemotePeer>),
}

impl PeerRef {
    pub fn peer_id(&self) -> &str {
        match self {
            Self::Local(peer) => peer.peer_id(),
            Self::Remote(peer) => peer.peer_id(),
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            Self::Local(peer) => peer.origin(),
            Self::Remote(peer) => peer.origin(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Local(peer) => peer.is_connected(),
            Self::Remote(peer) => peer.is_connected(),
        }
    }

    pub fn is_stopping(&self) -> bool {
        match self {
            Self::Local(peer) => peer.is_stopping(),
            Self::Remote(peer) => peer.is_stopping(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        match self {
            Self::Local(peer) => peer.subscribe(),
            Self::Remote(peer) => peer.subscribe(),
        }
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            peer_id: self.peer_id().to_string(),
            origin: self.origin().to_string(),
            is_local: self.is_local(),
            connected: self.is_connected(),
            stopping: self.is_stopping(),
            inactive_ms: match self {
                Self::Local(_) => None,
                Self::Remote(peer) => Some(peer.inactive_time()),
            },
        }
    }
}

/// Identity comparison: two refs are equal when they point at the same peer object
impl PartialEq for PeerRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Local(a), Self::Local(b)) => Arc::ptr_eq(a, b),
            (Self::Remote(a), Self::Remote(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_local() { "Local" } else { "Remote" };
        f.debug_struct(kind)
            .field("peer_id", &self.peer_id())
            .field("origin", &self.origin())
            .finish()
    }
}

impl From<Arc<LocalPeer>> for PeerRef {
    fn from(peer: Arc<LocalPeer>) -> Self {
        Self::Local(peer)
    }
}

impl From<Arc<RemotePeer>> for PeerRef {
    fn from(peer: Arc<RemotePeer>) -> Self {
        Self::Remote(peer)
    }
}
