//! Core types shared across peer-mesh components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application message exchanged between cluster members.
///
/// The mesh never looks inside a message; it is carried as JSON text on the
/// wire and handed to subscribers as a parsed value.
pub type Message = serde_json::Value;

/// Registration descriptor for a remote cluster member
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Unique peer identifier
    pub peer_id: String,

    /// Base WebSocket URL of the peer (e.g. `ws://10.0.0.2:8900/mesh`)
    pub origin: String,

    /// Pre-shared key, presented on outbound dials and required on inbound ones
    pub psk: String,
}

impl PeerDescriptor {
    pub fn new(
        peer_id: impl Into<String>,
        origin: impl Into<String>,
        psk: impl Into<String>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            origin: origin.into(),
            psk: psk.into(),
        }
    }
}

// Keeps the key out of logs
impl fmt::Debug for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerDescriptor")
            .field("peer_id", &self.peer_id)
            .field("origin", &self.origin)
            .field("psk", &"<redacted>")
            .finish()
    }
}

/// Point-in-time view of one cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Peer identifier
    pub peer_id: String,

    /// Peer origin
    pub origin: String,

    /// True for the node's own entry
    pub is_local: bool,

    /// Has an active connection (always true for the local node until stopped)
    pub connected: bool,

    /// Has been stopped
    pub stopping: bool,

    /// Milliseconds since the link last showed activity, measured at the last sweep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_ms: Option<u64>,
}
