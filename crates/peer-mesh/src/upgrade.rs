//! Inbound upgrade handling.
//!
//! [`router`] mounts the cluster on an axum [`Router`]. Requests on the
//! cluster's path are authenticated against the registered peers before the
//! WebSocket handshake completes; anything else is left to the host router
//! unless `respond_404` is set.

use axum::Router;
use axum::extract::{Query, State};
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use mesh_common::constants::handshake::X_CONNECTION_SERIAL;
use serde::Deserialize;
use std::sync::Arc;

use crate::cluster::PeerCluster;
use crate::remote::RemotePeer;

/// The parts of an upgrade request the cluster looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub path: String,
    /// `Origin` header
    pub origin: Option<String>,
    /// `x-connection-serial` header; None when missing or malformed
    pub serial: Option<u64>,
    /// `psk` query parameter, percent-decoded
    pub psk: Option<String>,
}

impl UpgradeRequest {
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let serial = headers
            .get(X_CONNECTION_SERIAL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());

        let psk = Query::<UpgradeQuery>::try_from_uri(uri)
            .ok()
            .and_then(|Query(query)| query.psk);

        Self {
            path: uri.path().to_string(),
            origin,
            serial,
            psk,
        }
    }
}

/// Query string of an upgrade request
#[derive(Debug, Deserialize)]
struct UpgradeQuery {
    psk: Option<String>,
}

/// What the cluster decided about an upgrade request
#[derive(Debug)]
pub enum UpgradeOutcome {
    /// Authenticated; complete the handshake and hand the socket to `peer`
    Accept { peer: Arc<RemotePeer>, serial: Option<u64> },
    /// Answer with this status and close
    Reject(StatusCode),
    /// Not addressed to the cluster
    Ignore,
}

/// Router serving the cluster's upgrade endpoint
pub fn router(cluster: PeerCluster) -> Router {
    let path = cluster.pathname().to_string();
    let respond_404 = cluster.settings().respond_404;

    let router = Router::new().route(&path, any(accept_upgrade));
    let router = if respond_404 {
        router.fallback(not_found)
    } else {
        router
    };

    router.with_state(cluster)
}

impl PeerCluster {
    /// Shorthand for [`router`]
    pub fn router(&self) -> Router {
        router(self.clone())
    }
}

async fn accept_upgrade(
    State(cluster): State<PeerCluster>,
    uri: Uri,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let request = UpgradeRequest::from_parts(&uri, &headers);

    match cluster.try_upgrade(&request) {
        UpgradeOutcome::Accept { peer, serial } => {
            tracing::debug!(peer = %peer.peer_id(), ?serial, "Accepting inbound connection");
            upgrade.on_upgrade(move |socket| async move {
                peer.accept_inbound(socket, serial);
            })
        }
        UpgradeOutcome::Reject(status) => reject(status),
        UpgradeOutcome::Ignore => reject(StatusCode::NOT_FOUND),
    }
}

async fn not_found() -> Response {
    reject(StatusCode::NOT_FOUND)
}

/// Plain HTTP refusal that also closes the underlying connection
pub(crate) fn reject(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [
            (header::CONNECTION, "close"),
            (header::CONTENT_TYPE, "text/html"),
        ],
        reason,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_from_parts() {
        let uri: Uri = "/mesh?x=1&psk=p%20s%26k".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("ws://server2/"));
        headers.insert(X_CONNECTION_SERIAL, HeaderValue::from_static("1700000000123"));

        let request = UpgradeRequest::from_parts(&uri, &headers);
        assert_eq!(request.path, "/mesh");
        assert_eq!(request.origin.as_deref(), Some("ws://server2/"));
        assert_eq!(request.serial, Some(1_700_000_000_123));
        assert_eq!(request.psk.as_deref(), Some("p s&k"));
    }

    #[test]
    fn test_from_parts_defaults() {
        let uri: Uri = "/".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(X_CONNECTION_SERIAL, HeaderValue::from_static("soon"));

        let request = UpgradeRequest::from_parts(&uri, &headers);
        assert_eq!(request.origin, None);
        assert_eq!(request.serial, None);
        assert_eq!(request.psk, None);
    }

    #[test]
    fn test_psk_query_decoding() {
        let headers = HeaderMap::new();
        let psk = |uri: &str| UpgradeRequest::from_parts(&uri.parse().unwrap(), &headers).psk;

        assert_eq!(psk("/?psk=a+b").as_deref(), Some("a b"));
        assert_eq!(psk("/?other=1&psk=p%3Dq").as_deref(), Some("p=q"));
        assert_eq!(psk("/?other=1"), None);
    }

    #[test]
    fn test_reject_response() {
        let response = reject(StatusCode::UNAUTHORIZED);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }
}
