//! Cluster settings and the runtime context shared with remote peers.

use axum::http::Uri;
use mesh_common::MeshError;
use mesh_common::constants::{
    DEFAULT_ACTIVITY_CHECK_INTERVAL_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS,
    DEFAULT_INACTIVITY_PING_FATAL_MS, DEFAULT_INACTIVITY_PING_LOCAL_MS,
    DEFAULT_INACTIVITY_PING_REMOTE_MS,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cluster configuration, fixed once the cluster is built
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterSettings {
    /// This node's unique ID
    pub peer_id: String,

    /// This node's base WebSocket URL; its path is where upgrades are accepted
    pub origin: String,

    /// Period of the health sweep
    #[serde(default = "default_activity_check_interval")]
    pub activity_check_interval_ms: u64,

    /// Idle time before pinging a connection this node dialed
    #[serde(default = "default_inactivity_ping_local")]
    pub inactivity_ping_local_ms: u64,

    /// Idle time before pinging a connection accepted inbound
    #[serde(default = "default_inactivity_ping_remote")]
    pub inactivity_ping_remote_ms: u64,

    /// Idle time after which the link is redialed instead of pinged
    #[serde(default = "default_inactivity_ping_fatal")]
    pub inactivity_ping_fatal_ms: u64,

    /// Outbound handshake timeout
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Answer 404 to upgrade requests on other paths instead of ignoring them
    #[serde(default)]
    pub respond_404: bool,
}

// Default value functions
fn default_activity_check_interval() -> u64 { DEFAULT_ACTIVITY_CHECK_INTERVAL_MS }
fn default_inactivity_ping_local() -> u64 { DEFAULT_INACTIVITY_PING_LOCAL_MS }
fn default_inactivity_ping_remote() -> u64 { DEFAULT_INACTIVITY_PING_REMOTE_MS }
fn default_inactivity_ping_fatal() -> u64 { DEFAULT_INACTIVITY_PING_FATAL_MS }
fn default_handshake_timeout() -> u64 { DEFAULT_HANDSHAKE_TIMEOUT_MS }

impl ClusterSettings {
    /// Settings with every timing parameter at its default
    pub fn new(peer_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            origin: origin.into(),
            activity_check_interval_ms: default_activity_check_interval(),
            inactivity_ping_local_ms: default_inactivity_ping_local(),
            inactivity_ping_remote_ms: default_inactivity_ping_remote(),
            inactivity_ping_fatal_ms: default_inactivity_ping_fatal(),
            handshake_timeout_ms: default_handshake_timeout(),
            respond_404: false,
        }
    }

    /// Check the settings and return the path component of `origin`
    pub fn validate(&self) -> Result<String, MeshError> {
        if self.peer_id.is_empty() {
            return Err(MeshError::empty("peerID"));
        }
        if self.origin.is_empty() {
            return Err(MeshError::empty("origin"));
        }
        if self.activity_check_interval_ms == 0 {
            return Err(MeshError::InvalidSetting {
                field: "activityCheckInterval",
                reason: "must be greater than zero",
            });
        }

        origin_path(&self.origin)
    }

    pub fn activity_check_interval(&self) -> Duration {
        Duration::from_millis(self.activity_check_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Path component of an origin URL (`/` when the URL has none)
pub(crate) fn origin_path(origin: &str) -> Result<String, MeshError> {
    let uri: Uri = origin.parse().map_err(|_| MeshError::InvalidSetting {
        field: "origin",
        reason: "must be a valid URL",
    })?;

    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(MeshError::InvalidSetting {
            field: "origin",
            reason: "must be an absolute URL",
        });
    }

    Ok(uri.path().to_string())
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Cluster state that remote peers read while deciding what to do
#[derive(Debug)]
pub(crate) struct ClusterContext {
    pub settings: ClusterSettings,
    last_interval: AtomicU64,
}

impl ClusterContext {
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            last_interval: AtomicU64::new(now_millis()),
        }
    }

    /// Timestamp of the last completed sweep
    pub fn last_interval(&self) -> u64 {
        self.last_interval.load(Ordering::Acquire)
    }

    pub fn set_last_interval(&self, timestamp: u64) {
        self.last_interval.store(timestamp, Ordering::Release);
    }
}
