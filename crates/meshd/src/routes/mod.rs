//! HTTP route handlers for meshd.

use axum::{
    Router,
    routing::{delete, get, post},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mesh_common::MeshError;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod health;
mod peers;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let mesh = state.cluster.router();

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Admin endpoints (bind to a private interface in production)
        .nest("/admin", admin_routes())

        // Add shared state
        .with_state(state)

        // Cluster upgrade endpoint at the origin path
        .merge(mesh)
        .layer(TraceLayer::new_for_http())
}

/// Admin routes (peer registry, message injection)
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/peers", get(peers::list_peers).post(peers::add_peer))
        .route("/peers/{peer_id}", delete(peers::remove_peer))
        .route("/send", post(peers::send_message))
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Cluster error rendered as a JSON body with the matching status
pub struct ApiError(MeshError);

impl From<MeshError> for ApiError {
    fn from(error: MeshError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::debug!(error = %self.0, %status, "Admin request failed");

        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use mesh_common::PeerDescriptor;
    use peer_mesh::{ClusterSettings, PeerCluster, PeerEvent};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn state() -> AppState {
        let settings = ClusterSettings::new("server1", "ws://127.0.0.1:8900/mesh");
        let cluster = PeerCluster::new(settings.clone()).unwrap();
        let config = AppConfig {
            listen_addr: "127.0.0.1:8900".to_string(),
            cluster: settings,
            peers: Vec::new(),
        };
        AppState::new(config, cluster)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["peer_id"], "server1");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ready_waits_for_peers() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/ready", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["peers"], 0);

        state
            .cluster
            .add_peer(PeerDescriptor::new("server2", "ws://127.0.0.1:8901/mesh", "psk"))
            .unwrap();
        let (status, _) = call(&state, request(Method::GET, "/ready", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_peer_registry() {
        let state = state();
        let descriptor = json!({
            "peer_id": "server2",
            "origin": "ws://127.0.0.1:8901/mesh",
            "psk": "psk",
        });

        let (status, body) = call(&state, request(Method::POST, "/admin/peers", Some(descriptor.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["peer_id"], "server2");
        assert_eq!(body["connected"], false);

        let (status, body) = call(&state, request(Method::POST, "/admin/peers", Some(descriptor))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Duplicate peerID or origin");

        let (status, body) = call(&state, request(Method::GET, "/admin/peers", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[0]["is_local"], true);
        assert_eq!(body[1]["peer_id"], "server2");

        let (status, _) = call(&state, request(Method::DELETE, "/admin/peers/server2", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.cluster.peers().is_empty());

        let (status, body) = call(&state, request(Method::DELETE, "/admin/peers/server2", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Peer 'server2' does not exist.");

        let (status, _) = call(&state, request(Method::DELETE, "/admin/peers/server1", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_peer_collision() {
        let state = state();
        let descriptor = json!({
            "peer_id": "server1",
            "origin": "ws://elsewhere/",
            "psk": "psk",
        });

        let (status, body) = call(&state, request(Method::POST, "/admin/peers", Some(descriptor))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "addPeer cannot match local server");
    }

    #[tokio::test]
    async fn test_send() {
        let state = state();
        let mut local = state.cluster.local_peer().subscribe();

        let (status, _) = call(
            &state,
            request(Method::POST, "/admin/send", Some(json!({"message": {"a": 1}, "targets": "all"}))),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        match local.try_recv() {
            Ok(PeerEvent::Receive(message)) => assert_eq!(*message, json!({"a": 1})),
            other => panic!("unexpected event {:?}", other),
        }

        // Default targets leave the local node out
        let (status, _) = call(&state, request(Method::POST, "/admin/send", Some(json!({"message": 2})))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(local.try_recv().is_err());

        let (status, _) = call(
            &state,
            request(Method::POST, "/admin/send", Some(json!({"message": 3, "targets": ["server1"]}))),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(matches!(local.try_recv(), Ok(PeerEvent::Receive(_))));

        let (status, body) = call(
            &state,
            request(Method::POST, "/admin/send", Some(json!({"message": 4, "targets": ["server1", "nobody"]}))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Could not find peerID 'nobody'");
        assert!(local.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mesh_endpoint_mounted() {
        let state = state();

        // Plain GET without upgrade headers is refused by the upgrade handler
        let (status, _) = call(&state, request(Method::GET, "/mesh", None)).await;
        assert!(status.is_client_error());

        // Other paths are left to the host router
        let (status, _) = call(&state, request(Method::GET, "/elsewhere", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
