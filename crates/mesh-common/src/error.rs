//! Common error types for peer-mesh components.

use thiserror::Error;

/// Errors surfaced by cluster and peer operations
#[derive(Debug, Error)]
pub enum MeshError {
    /// A required setting or descriptor field is missing or malformed
    #[error("{field} {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: &'static str,
    },

    /// A peer descriptor reuses the local node's id or origin
    #[error("addPeer cannot match local server")]
    LocalCollision,

    /// A peer descriptor reuses a registered peer's id or origin
    #[error("Duplicate peerID or origin")]
    DuplicatePeer,

    /// No registered peer has this id
    #[error("Peer '{0}' does not exist.")]
    PeerNotFound(String),

    /// The local peer cannot be removed from its own cluster
    #[error("Cannot remove local peer.")]
    CannotRemoveLocal,

    /// A send target names an unknown peer id
    #[error("Could not find peerID '{0}'")]
    UnknownTarget(String),

    /// A send target references a peer that does not belong to this cluster
    #[error("Invalid peer at index {index}")]
    InvalidTarget { index: usize },

    /// Message payload could not be encoded or decoded
    #[error("Invalid message payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeshError {
    /// Shorthand for the "must be a non-empty string" setting error
    pub fn empty(field: &'static str) -> Self {
        Self::InvalidSetting {
            field,
            reason: "must be a non-empty string",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSetting { .. } => 400,
            Self::LocalCollision => 409,
            Self::DuplicatePeer => 409,
            Self::PeerNotFound(_) => 404,
            Self::CannotRemoveLocal => 400,
            Self::UnknownTarget(_) => 404,
            Self::InvalidTarget { .. } => 400,
            Self::Json(_) => 400,
        }
    }
}
