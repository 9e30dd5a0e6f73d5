//! Admin endpoints: peer registry and message injection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mesh_common::{Message, PeerDescriptor, PeerStatus};
use peer_mesh::{PeerRef, Targets};
use serde::Deserialize;
use std::sync::Arc;

use super::ApiError;
use crate::state::AppState;

/// Status of every cluster member, the local node first
pub async fn list_peers(
    State(state): State<AppState>,
) -> Json<Vec<PeerStatus>> {
    Json(state.cluster.status())
}

/// Register a remote peer; it is dialed on the next sweep
pub async fn add_peer(
    State(state): State<AppState>,
    Json(descriptor): Json<PeerDescriptor>,
) -> Result<(StatusCode, Json<PeerStatus>), ApiError> {
    let peer = state.cluster.add_peer(descriptor)?;
    Ok((StatusCode::CREATED, Json(PeerRef::Remote(peer).status())))
}

pub async fn remove_peer(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.cluster.remove_peer(&peer_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TargetSet {
    All,
    Remotes,
}

/// `"all"`, `"remotes"` or a list of peer ids
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SendTargets {
    Set(TargetSet),
    Peers(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    message: Message,
    #[serde(default)]
    targets: Option<SendTargets>,
}

/// Send a message from this node
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<StatusCode, ApiError> {
    let targets = match request.targets {
        None | Some(SendTargets::Set(TargetSet::Remotes)) => Targets::Remotes,
        Some(SendTargets::Set(TargetSet::All)) => Targets::All,
        Some(SendTargets::Peers(ids)) => ids.into(),
    };

    tracing::debug!(?targets, "Sending admin message");
    state.cluster.send(&Arc::new(request.message), targets)?;
    Ok(StatusCode::ACCEPTED)
}
