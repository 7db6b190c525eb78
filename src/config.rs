//! Top-level node configuration.
//!
//! Aggregates configuration for storage, gossip participation, and the
//! metrics exporter into a single [`NodeConfig`] that binaries can build
//! from defaults, flags, or the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::semantic::KernelParams;

/// Configuration for the content store.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Storage directory for the embedded database.
    pub path: PathBuf,
    /// Run on the ephemeral in-memory backend instead of disk.
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tera-db"),
            in_memory: false,
        }
    }
}

impl StorageConfig {
    /// In-memory configuration, for tests and ephemeral nodes.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            in_memory: true,
        }
    }
}

/// Configuration for gossip participation.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Listen port for the transport (0 for random).
    pub listen_port: u16,
    /// Addresses of bootstrap peers to connect to.
    pub bootstrap_peers: Vec<String>,
    /// Interest strings driving the semantic gate.
    pub interests: Vec<String>,
    /// Kernel parameters applied to every interest.
    pub params: KernelParams,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            bootstrap_peers: Vec::new(),
            interests: vec![
                "machine learning".to_string(),
                "artificial intelligence".to_string(),
            ],
            params: KernelParams {
                threshold: 0.3,
                ..KernelParams::default()
            },
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run the `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the exporter to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a node.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub gossip: GossipConfig,
    pub metrics: MetricsConfig,
}
