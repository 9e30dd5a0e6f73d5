//! Remote peer connection state machine.
//!
//! A remote peer owns every socket between this node and one other node.
//! Sockets arrive from two directions (our dials and the other side's
//! dials) and both funnel into [`RemotePeer::got_ws`], where
//! [`keep_existing`] decides which single socket stays active.

use axum::extract::ws::WebSocket;
use mesh_common::constants::handshake::{PSK_PARAM, X_CONNECTION_SERIAL};
use mesh_common::{Message, MeshError, PeerDescriptor};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;

use crate::arbitration::keep_existing;
use crate::connection::{self, Connection, ConnectionId, FrameHandler, next_connection_id};
use crate::peer::{ClusterEvent, PeerCore, PeerEvent};
use crate::settings::{ClusterContext, now_millis};

/// The currently active socket and how it came to be
struct ActiveLink {
    connection: Connection,
    /// None when the dialer sent no usable serial
    serial: Option<u64>,
    local: bool,
}

/// An outbound dial that has not completed its handshake yet
struct PendingDial {
    id: ConnectionId,
    serial: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct Link {
    active: Option<ActiveLink>,
    dial: Option<PendingDial>,
    /// Sweep timestamp at which the active socket last showed activity
    last_active: u64,
}

/// Another node of the cluster and the connection to it
pub struct RemotePeer {
    core: PeerCore,
    origin: String,
    psk: String,
    context: Arc<ClusterContext>,
    link: Mutex<Link>,
    me: Weak<RemotePeer>,
}

impl RemotePeer {
    pub(crate) fn new(
        context: Arc<ClusterContext>,
        descriptor: PeerDescriptor,
        cluster_events: Option<broadcast::Sender<ClusterEvent>>,
    ) -> Result<Arc<Self>, MeshError> {
        if descriptor.peer_id.is_empty() {
            return Err(MeshError::empty("peerID"));
        }
        if descriptor.origin.is_empty() {
            return Err(MeshError::empty("origin"));
        }
        if descriptor.psk.is_empty() {
            return Err(MeshError::empty("psk"));
        }

        let PeerDescriptor { peer_id, origin, psk } = descriptor;
        Ok(Arc::new_cyclic(|me| Self {
            core: PeerCore::new(peer_id, cluster_events),
            origin,
            psk,
            context,
            link: Mutex::new(Link::default()),
            me: me.clone(),
        }))
    }

    pub fn peer_id(&self) -> &str {
        self.core.peer_id()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_stopping(&self) -> bool {
        self.core.is_stopping()
    }

    /// Has an active socket and has not been stopped
    pub fn is_connected(&self) -> bool {
        !self.is_stopping() && self.link.lock().active.is_some()
    }

    /// An outbound dial is in flight
    pub fn is_dialing(&self) -> bool {
        self.link.lock().dial.is_some()
    }

    /// Milliseconds between the last sweep and the last observed activity
    pub fn inactive_time(&self) -> u64 {
        let link = self.link.lock();
        self.inactive_since(&link)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.core.subscribe()
    }

    /// Send a serialized message on the active socket.
    ///
    /// Dropped when stopped or disconnected; nothing is queued or retried.
    pub fn send(&self, data: String) {
        if self.is_stopping() {
            return;
        }

        let link = self.link.lock();
        match &link.active {
            Some(active) => {
                active.connection.send(data);
            }
            None => tracing::trace!(peer = %self.peer_id(), "Dropping message for disconnected peer"),
        }
    }

    /// Dial the peer unless a dial is already in flight.
    ///
    /// A stalled active socket is deliberately not considered here; the
    /// heartbeat replaces it once it crosses the fatal threshold.
    pub fn try_outbound(&self) {
        let mut link = self.link.lock();
        // stop() flips the flag under this lock
        if link.dial.is_some() || self.is_stopping() {
            return;
        }
        let Some(peer) = self.me.upgrade() else {
            return;
        };

        let serial = now_millis();
        let request = match self.dial_request(serial) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(peer = %self.peer_id(), error = %e, "Cannot build outbound request");
                return;
            }
        };

        let id = next_connection_id();
        let timeout = self.context.settings.handshake_timeout();
        let task = tokio::spawn(async move {
            peer.dial(id, request, serial, timeout).await;
        });

        tracing::debug!(peer = %self.peer_id(), serial, "Dialing peer");
        link.dial = Some(PendingDial {
            id,
            serial,
            task: task.abort_handle(),
        });
    }

    /// WebSocket handshake request presenting our origin, the key and the serial
    fn dial_request(&self, serial: u64) -> Result<Request, tungstenite::Error> {
        let url = format!(
            "{}?{}={}",
            self.origin,
            PSK_PARAM,
            urlencoding::encode(&self.psk)
        );
        let mut request = url.into_client_request()?;

        let origin = HeaderValue::from_str(&self.context.settings.origin)
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        let headers = request.headers_mut();
        headers.insert(ORIGIN, origin);
        headers.insert(X_CONNECTION_SERIAL, HeaderValue::from(serial));

        Ok(request)
    }

    async fn dial(self: Arc<Self>, id: ConnectionId, request: Request, serial: u64, timeout: Duration) {
        match tokio::time::timeout(timeout, connect_async(request)).await {
            Ok(Ok((socket, _response))) => {
                let connection = connection::spawn(socket, self.me.clone());
                self.got_ws(connection, Some(serial), true);
            }
            Ok(Err(e)) => {
                tracing::debug!(peer = %self.peer_id(), error = %e, "Outbound connection failed");
            }
            Err(_) => {
                tracing::debug!(peer = %self.peer_id(), ?timeout, "Outbound handshake timed out");
            }
        }

        let mut link = self.link.lock();
        if link.dial.as_ref().is_some_and(|dial| dial.id == id) {
            link.dial = None;
        }
    }

    /// Take ownership of an upgraded inbound socket
    pub(crate) fn accept_inbound(&self, socket: WebSocket, serial: Option<u64>) {
        let connection = connection::spawn(socket, self.me.clone());
        self.got_ws(connection, serial, false);
    }

    /// Install `connection` as the active socket unless the current one wins arbitration.
    ///
    /// A socket without a serial on either side never wins against the other one.
    pub(crate) fn got_ws(&self, connection: Connection, serial: Option<u64>, local: bool) {
        let previous = {
            let mut link = self.link.lock();
            if self.is_stopping() {
                drop(link);
                connection.close();
                return;
            }

            let keep = link.active.as_ref().is_some_and(|active| match (active.serial, serial) {
                (Some(existing), Some(challenger)) => keep_existing(
                    existing,
                    active.local,
                    challenger,
                    &self.context.settings.peer_id,
                    self.peer_id(),
                ),
                _ => false,
            });
            if keep {
                drop(link);
                tracing::debug!(peer = %self.peer_id(), ?serial, local, "Dropping duplicate connection");
                connection.close();
                return;
            }

            link.last_active = self.context.last_interval();
            link.active.replace(ActiveLink {
                connection,
                serial,
                local,
            })
        };

        if let Some(previous) = previous {
            previous.connection.close();
        }

        tracing::info!(peer = %self.peer_id(), ?serial, local, "Peer connected");
        if !self.is_stopping() {
            self.core.emit(PeerEvent::Connected);
        }
    }

    /// Heartbeat step: ping an idle socket, or redial a missing or dead one
    pub(crate) fn on_interval(&self) {
        let settings = &self.context.settings;
        {
            let link = self.link.lock();
            let inactive = self.inactive_since(&link);

            if let Some(active) = link
                .active
                .as_ref()
                .filter(|_| inactive < settings.inactivity_ping_fatal_ms)
            {
                let threshold = if active.local {
                    settings.inactivity_ping_local_ms
                } else {
                    settings.inactivity_ping_remote_ms
                };

                if inactive >= threshold {
                    tracing::debug!(peer = %self.peer_id(), inactive, "Pinging idle peer");
                    active.connection.ping();
                }
                return;
            }
        }

        self.try_outbound();
    }

    /// Credential check for inbound upgrades
    pub(crate) fn check_inbound(&self, psk: &str) -> bool {
        !psk.is_empty() && self.psk == psk
    }

    fn inactive_since(&self, link: &Link) -> u64 {
        self.context.last_interval().saturating_sub(link.last_active)
    }

    fn is_active(link: &Link, id: ConnectionId) -> bool {
        link.active.as_ref().is_some_and(|active| active.connection.id() == id)
    }

    fn on_message(&self, id: ConnectionId, payload: &[u8]) {
        if self.is_stopping() {
            return;
        }

        let parsed = serde_json::from_slice::<Message>(payload);
        {
            let mut link = self.link.lock();
            // Frames racing in on a superseded socket
            if !Self::is_active(&link, id) {
                return;
            }
            if parsed.is_ok() {
                link.last_active = self.context.last_interval();
            }
        }

        match parsed {
            Ok(message) => self.core.emit(PeerEvent::Receive(Arc::new(message))),
            Err(e) => {
                tracing::warn!(peer = %self.peer_id(), error = %e, "Invalid message from peer");
                self.core.emit(PeerEvent::Error(Arc::new(MeshError::from(e))));
            }
        }
    }

    /// Returns true if the peer was already stopped
    pub(crate) fn stop(&self) -> bool {
        let (active, dial) = {
            let mut link = self.link.lock();
            if self.core.stop() {
                return true;
            }
            (link.active.take(), link.dial.take())
        };

        if let Some(dial) = dial {
            tracing::debug!(peer = %self.peer_id(), serial = dial.serial, "Abandoning outbound dial");
            dial.task.abort();
        }

        if let Some(active) = active {
            active.connection.close();
            tracing::info!(peer = %self.peer_id(), "Peer disconnected (stopped)");
            self.core.emit(PeerEvent::Disconnected);
        }

        false
    }
}

impl fmt::Debug for RemotePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePeer")
            .field("peer_id", &self.peer_id())
            .field("origin", &self.origin)
            .field("connected", &self.is_connected())
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}

impl FrameHandler for RemotePeer {
    fn on_payload(&self, id: ConnectionId, payload: &[u8]) {
        self.on_message(id, payload);
    }

    fn on_activity(&self, id: ConnectionId) {
        let mut link = self.link.lock();
        if Self::is_active(&link, id) {
            link.last_active = self.context.last_interval();
        }
    }

    fn on_close(&self, id: ConnectionId) {
        let closed = {
            let mut link = self.link.lock();
            if Self::is_active(&link, id) {
                link.active.take()
            } else {
                None
            }
        };

        if let Some(closed) = closed {
            tracing::info!(peer = %self.peer_id(), serial = ?closed.serial, "Peer disconnected");
            self.core.emit(PeerEvent::Disconnected);
        }
    }
}
