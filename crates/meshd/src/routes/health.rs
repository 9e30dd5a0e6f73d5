//! Health check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    peer_id: String,
}

/// Basic health check (is the server running?)
pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        peer_id: state.config.cluster.peer_id.clone(),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    connected: usize,
    peers: usize,
}

/// Readiness check (is every remote peer linked?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let (connected, peers) = state.connected_peers();

    if connected == peers && !state.cluster.is_stopping() {
        Ok(Json(ReadyResponse {
            status: "ready",
            connected,
            peers,
        }))
    } else {
        // Return 503 if not ready
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
