//! Shared constants for peer-mesh components.

/// Default interval between cluster health sweeps (1 second)
pub const DEFAULT_ACTIVITY_CHECK_INTERVAL_MS: u64 = 1_000;

/// Idle time before pinging a connection this node dialed (4 seconds)
pub const DEFAULT_INACTIVITY_PING_LOCAL_MS: u64 = 4_000;

/// Idle time before pinging a connection accepted inbound (6 seconds)
pub const DEFAULT_INACTIVITY_PING_REMOTE_MS: u64 = 6_000;

/// Idle time after which a link is redialed instead of pinged (10 seconds)
pub const DEFAULT_INACTIVITY_PING_FATAL_MS: u64 = 10_000;

/// Outbound WebSocket handshake timeout (2 seconds)
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 2_000;

/// Default meshd HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8900";

/// Buffered events per subscriber before a slow receiver starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// HTTP header and query names used on the upgrade handshake
pub mod handshake {
    /// Connection serial header (attempt timestamp in milliseconds)
    pub const X_CONNECTION_SERIAL: &str = "x-connection-serial";

    /// Query parameter carrying the pre-shared key
    pub const PSK_PARAM: &str = "psk";
}
