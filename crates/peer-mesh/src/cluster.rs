//! Cluster orchestration.
//!
//! [`PeerCluster`] owns the peer registry, drives the periodic health sweep,
//! authenticates inbound upgrades and fans messages out to peers.

use axum::http::StatusCode;
use mesh_common::constants::EVENT_CHANNEL_CAPACITY;
use mesh_common::{Message, MeshError, PeerDescriptor, PeerStatus};
use parking_lot::{Mutex, RwLock};
use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::local::LocalPeer;
use crate::peer::{ClusterEvent, PeerRef};
use crate::remote::RemotePeer;
use crate::settings::{ClusterContext, ClusterSettings, now_millis};
use crate::upgrade::{UpgradeOutcome, UpgradeRequest};

/// One recipient in an explicit target list
#[derive(Debug, Clone)]
pub enum Target {
    /// Resolved with [`PeerCluster::find_peer`]
    Id(String),
    /// Must be a member of the sending cluster
    Peer(PeerRef),
}

impl From<&str> for Target {
    fn from(peer_id: &str) -> Self {
        Self::Id(peer_id.to_string())
    }
}

impl From<String> for Target {
    fn from(peer_id: String) -> Self {
        Self::Id(peer_id)
    }
}

impl From<PeerRef> for Target {
    fn from(peer: PeerRef) -> Self {
        Self::Peer(peer)
    }
}

/// Recipients of [`PeerCluster::send`]
#[derive(Debug, Clone, Default)]
pub enum Targets {
    /// The local peer and every remote peer
    All,
    /// Every remote peer; the local peer is left out
    #[default]
    Remotes,
    /// An explicit list
    Peers(Vec<Target>),
}

impl<T: Into<Target>> From<Vec<T>> for Targets {
    fn from(targets: Vec<T>) -> Self {
        Self::Peers(targets.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Targets {
    fn from(peer_id: &str) -> Self {
        Self::Peers(vec![peer_id.into()])
    }
}

impl From<PeerRef> for Targets {
    fn from(peer: PeerRef) -> Self {
        Self::Peers(vec![peer.into()])
    }
}

struct ClusterInner {
    context: Arc<ClusterContext>,
    pathname: String,
    local: Arc<LocalPeer>,
    peers: RwLock<Vec<Arc<RemotePeer>>>,
    stopping: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClusterEvent>,
}

impl ClusterInner {
    fn is_active(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Health sweep
    fn on_interval(&self) {
        // A tick may already be queued when stop() runs
        if !self.is_active() {
            return;
        }

        self.context.set_last_interval(now_millis());

        let ping_local = self.context.settings.inactivity_ping_local_ms;
        let due: Vec<Arc<RemotePeer>> = self
            .peers
            .read()
            .iter()
            .filter(|peer| !peer.is_connected() || peer.inactive_time() >= ping_local)
            .cloned()
            .collect();

        for peer in due {
            peer.on_interval();
        }
    }

    fn find_remote(peers: &[Arc<RemotePeer>], peer_id: &str) -> Option<Arc<RemotePeer>> {
        peers.iter().find(|peer| peer.peer_id() == peer_id).cloned()
    }
}

impl Drop for ClusterInner {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
        for peer in self.peers.get_mut().iter() {
            peer.stop();
        }
    }
}

/// A full mesh of WebSocket links between this node and its configured peers
#[derive(Clone)]
pub struct PeerCluster {
    inner: Arc<ClusterInner>,
}

impl PeerCluster {
    /// Build a cluster from validated settings
    pub fn new(settings: ClusterSettings) -> Result<Self, MeshError> {
        let pathname = settings.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let local = Arc::new(LocalPeer::new(
            settings.peer_id.clone(),
            settings.origin.clone(),
            Some(events.clone()),
        ));

        Ok(Self {
            inner: Arc::new(ClusterInner {
                context: Arc::new(ClusterContext::new(settings)),
                pathname,
                local,
                peers: RwLock::new(Vec::new()),
                stopping: AtomicBool::new(false),
                ticker: Mutex::new(None),
                events,
            }),
        })
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.inner.context.settings
    }

    pub fn peer_id(&self) -> &str {
        &self.settings().peer_id
    }

    pub fn origin(&self) -> &str {
        &self.settings().origin
    }

    /// Path component of the origin; upgrades are accepted here
    pub fn pathname(&self) -> &str {
        &self.inner.pathname
    }

    pub fn local_peer(&self) -> &Arc<LocalPeer> {
        &self.inner.local
    }

    /// Snapshot of the registered remote peers
    pub fn peers(&self) -> Vec<Arc<RemotePeer>> {
        self.inner.peers.read().clone()
    }

    /// The health sweep is scheduled
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// The cluster has been stopped for good
    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Timestamp (ms since epoch) of the last sweep
    pub fn last_interval(&self) -> u64 {
        self.inner.context.last_interval()
    }

    /// Receive, connect and disconnect events of every peer, tagged with the peer id
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.inner.events.subscribe()
    }

    /// Status of the local peer followed by every remote peer
    pub fn status(&self) -> Vec<PeerStatus> {
        iter::once(PeerRef::Local(self.inner.local.clone()))
            .chain(self.peers().into_iter().map(PeerRef::Remote))
            .map(|peer| peer.status())
            .collect()
    }

    /// Begin the periodic health sweep.
    ///
    /// Runs one sweep immediately, then one per `activity_check_interval_ms`.
    /// Does nothing when already running or after [`stop`](Self::stop).
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut ticker = self.inner.ticker.lock();
            if ticker.is_some() || self.is_stopping() {
                return;
            }

            let period = self.settings().activity_check_interval();
            let inner = Arc::downgrade(&self.inner);
            *ticker = Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    interval.tick().await;
                    match inner.upgrade() {
                        Some(inner) => inner.on_interval(),
                        None => break,
                    }
                }
            }));
        }

        tracing::info!(
            peer_id = %self.peer_id(),
            peers = self.inner.peers.read().len(),
            "Cluster started"
        );
        self.inner.on_interval();
    }

    /// Stop the sweep and every peer. The cluster cannot be restarted.
    pub fn stop(&self) {
        let ticker = {
            let mut ticker = self.inner.ticker.lock();
            let Some(handle) = ticker.take() else {
                return;
            };
            self.inner.stopping.store(true, Ordering::Release);
            handle
        };
        ticker.abort();

        self.inner.local.stop();
        for peer in self.peers() {
            peer.stop();
        }

        tracing::info!(peer_id = %self.peer_id(), "Cluster stopped");
    }

    #[cfg(test)]
    pub(crate) fn on_interval(&self) {
        self.inner.on_interval();
    }

    /// Decide what to do with an incoming upgrade request
    pub fn try_upgrade(&self, request: &UpgradeRequest) -> UpgradeOutcome {
        if request.path != self.inner.pathname {
            return if self.settings().respond_404 {
                UpgradeOutcome::Reject(StatusCode::NOT_FOUND)
            } else {
                UpgradeOutcome::Ignore
            };
        }

        let peer = request.origin.as_deref().and_then(|origin| {
            self.inner
                .peers
                .read()
                .iter()
                .find(|peer| peer.origin() == origin)
                .cloned()
        });

        match (peer, request.psk.as_deref()) {
            (Some(peer), Some(psk)) if peer.check_inbound(psk) => UpgradeOutcome::Accept {
                peer,
                serial: request.serial,
            },
            _ => {
                tracing::warn!(origin = ?request.origin, "Rejected unauthorized upgrade");
                UpgradeOutcome::Reject(StatusCode::UNAUTHORIZED)
            }
        }
    }

    /// Register a remote peer
    pub fn add_peer(&self, descriptor: PeerDescriptor) -> Result<Arc<RemotePeer>, MeshError> {
        if descriptor.peer_id == self.peer_id() || descriptor.origin == self.origin() {
            return Err(MeshError::LocalCollision);
        }

        let mut peers = self.inner.peers.write();
        if peers
            .iter()
            .any(|peer| peer.peer_id() == descriptor.peer_id || peer.origin() == descriptor.origin)
        {
            return Err(MeshError::DuplicatePeer);
        }

        let peer = RemotePeer::new(
            self.inner.context.clone(),
            descriptor,
            Some(self.inner.events.clone()),
        )?;
        peers.push(peer.clone());

        tracing::info!(peer = %peer.peer_id(), origin = %peer.origin(), "Peer added");
        Ok(peer)
    }

    /// Stop and deregister a remote peer
    pub fn remove_peer(&self, peer_id: &str) -> Result<(), MeshError> {
        if peer_id == self.peer_id() {
            return Err(MeshError::CannotRemoveLocal);
        }

        let peer = {
            let mut peers = self.inner.peers.write();
            let Some(index) = peers.iter().position(|peer| peer.peer_id() == peer_id) else {
                return Err(MeshError::PeerNotFound(peer_id.to_string()));
            };
            peers.remove(index)
        };
        peer.stop();

        tracing::info!(peer = %peer_id, "Peer removed");
        Ok(())
    }

    /// Look up a peer by id, the local peer included
    pub fn find_peer(&self, peer_id: &str) -> Option<PeerRef> {
        if peer_id == self.peer_id() {
            return Some(PeerRef::Local(self.inner.local.clone()));
        }

        ClusterInner::find_remote(&self.inner.peers.read(), peer_id).map(PeerRef::Remote)
    }

    /// Send `message` to `targets`.
    ///
    /// Every target is resolved before anything is delivered, so an invalid
    /// target means nobody receives the message. The local peer gets the
    /// caller's `Arc`; remote peers get the JSON text, encoded once.
    pub fn send(&self, message: &Arc<Message>, targets: impl Into<Targets>) -> Result<(), MeshError> {
        let recipients = self.resolve(targets.into())?;
        let data = serde_json::to_string(message.as_ref())?;

        for recipient in recipients {
            match recipient {
                PeerRef::Local(local) => local.send(Arc::clone(message)),
                PeerRef::Remote(remote) => remote.send(data.clone()),
            }
        }

        Ok(())
    }

    fn resolve(&self, targets: Targets) -> Result<Vec<PeerRef>, MeshError> {
        let peers = self.inner.peers.read();
        let remotes = || peers.iter().cloned().map(PeerRef::Remote);

        match targets {
            Targets::All => Ok(iter::once(PeerRef::Local(self.inner.local.clone()))
                .chain(remotes())
                .collect()),
            Targets::Remotes => Ok(remotes().collect()),
            Targets::Peers(list) => list
                .into_iter()
                .enumerate()
                .map(|(index, target)| match target {
                    Target::Id(peer_id) if peer_id == self.peer_id() => {
                        Ok(PeerRef::Local(self.inner.local.clone()))
                    }
                    Target::Id(peer_id) => ClusterInner::find_remote(&peers, &peer_id)
                        .map(PeerRef::Remote)
                        .ok_or(MeshError::UnknownTarget(peer_id)),
                    Target::Peer(peer) => {
                        let member = match &peer {
                            PeerRef::Local(local) => Arc::ptr_eq(local, &self.inner.local),
                            PeerRef::Remote(remote) => peers.iter().any(|p| Arc::ptr_eq(p, remote)),
                        };
                        if member {
                            Ok(peer)
                        } else {
                            Err(MeshError::InvalidTarget { index })
                        }
                    }
                })
                .collect(),
        }
    }
}
