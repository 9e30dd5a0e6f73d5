//! Configuration management for meshd.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use mesh_common::PeerDescriptor;
use mesh_common::constants::DEFAULT_LISTEN_ADDR;
use peer_mesh::ClusterSettings;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// This node's cluster settings
    pub cluster: ClusterSettings,

    /// Remote peers registered at startup
    #[serde(default)]
    pub peers: Vec<PeerDescriptor>,
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }

impl AppConfig {
    /// Load configuration from file, with CLI overrides.
    ///
    /// Without a config file, `--peer-id` and `--origin` are required.
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using CLI settings");
        }

        // Apply CLI overrides
        let settings = builder
            .set_override_option("listen_addr", args.listen.clone())?
            .set_override_option("cluster.peer_id", args.peer_id.clone())?
            .set_override_option("cluster.origin", args.origin.clone())?
            .build()
            .context("Failed to load config")?;

        settings
            .try_deserialize()
            .context("Failed to parse config (cluster.peer_id and cluster.origin are required)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Args;
    use clap::Parser;
    use std::path::PathBuf;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("meshd-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_from_file() {
        let path = write_config(
            "file",
            r#"
listen_addr = "0.0.0.0:9000"

[cluster]
peer_id = "server1"
origin = "ws://10.0.0.1:9000/mesh"
activity_check_interval_ms = 500
respond_404 = true

[[peers]]
peer_id = "server2"
origin = "ws://10.0.0.2:9000/mesh"
psk = "secret"
"#,
        );
        let args = Args::parse_from(["meshd", "--config", path.to_str().unwrap()]);

        let config = AppConfig::load(path.to_str().unwrap(), &args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.cluster.peer_id, "server1");
        assert_eq!(config.cluster.activity_check_interval_ms, 500);
        assert_eq!(config.cluster.inactivity_ping_local_ms, 4_000);
        assert!(config.cluster.respond_404);
        assert_eq!(config.peers, vec![PeerDescriptor::new("server2", "ws://10.0.0.2:9000/mesh", "secret")]);
    }

    #[test]
    fn test_cli_overrides_file() {
        let path = write_config(
            "override",
            r#"
[cluster]
peer_id = "server1"
origin = "ws://10.0.0.1:9000/"
"#,
        );
        let args = Args::parse_from([
            "meshd",
            "--listen",
            "127.0.0.1:9100",
            "--peer-id",
            "server9",
        ]);

        let config = AppConfig::load(path.to_str().unwrap(), &args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.cluster.peer_id, "server9");
        assert_eq!(config.cluster.origin, "ws://10.0.0.1:9000/");
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_cli_only() {
        let args = Args::parse_from([
            "meshd",
            "--peer-id",
            "server1",
            "--origin",
            "ws://127.0.0.1:8900/",
        ]);

        let config = AppConfig::load("does/not/exist.toml", &args).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.cluster.peer_id, "server1");
        assert_eq!(config.cluster.activity_check_interval_ms, 1_000);
    }

    #[test]
    fn test_missing_identity() {
        let args = Args::parse_from(["meshd"]);
        assert!(AppConfig::load("does/not/exist.toml", &args).is_err());
    }
}
