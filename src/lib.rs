//! TERA library crate.
//!
//! A content-addressed store whose primary identifier is a homomorphic
//! set hash with O(1) extension, combined with a two-gate admission
//! policy that filters inbound extensions on cryptographic validity and
//! semantic relevance:
//!
//! - the homomorphic hash primitive (`crypto`),
//! - universal feature extraction and a parameterised similarity kernel
//!   (`semantic`),
//! - dual-hashed content and extension types (`content`),
//! - the two-gate gatekeeper and interest filters (`gatekeeper`),
//! - a durable, transactional extension graph with verification,
//!   reconstruction, audit, and GC (`storage`),
//! - the wire schema and boundary node (`protocol`, `node`),
//! - Prometheus metrics (`metrics`) and node configuration (`config`).
//!
//! The gossip transport itself and any interactive CLI live outside the
//! crate; they consume the `Transport` trait and the `tera-node` binary
//! shows the wiring.

pub mod config;
pub mod content;
pub mod crypto;
pub(crate) mod encoding;
pub mod error;
pub mod gatekeeper;
pub mod metrics;
pub mod node;
pub mod protocol;
pub mod semantic;
pub mod storage;

// Re-export top-level configuration types.
pub use config::{GossipConfig, MetricsConfig, NodeConfig, StorageConfig};

// Re-export the core domain types at the crate root.
pub use content::{Content, DualHash, Extension, Query};
pub use crypto::{GroupHash, HASH_LEN};
pub use error::Error;
pub use semantic::{Features, KernelParams};

// Re-export the admission layer.
pub use gatekeeper::{Decision, Gatekeeper, GatekeeperStats, InterestFilter, RejectReason};

// Re-export the storage facade and its result types.
pub use storage::{
    ExtensionRecord, IntegrityReport, Store, StoreStats, VerificationResult,
};

// Re-export the boundary surfaces.
pub use node::{LoopbackTransport, Node, NodeStats, ShutdownHandle, Transport};
pub use protocol::{Message, MessageType, PROTOCOL_VERSION, TOPIC_EXTENSIONS};

// Re-export metrics.
pub use metrics::{MetricsRegistry, run_prometheus_http_server};

/// Type alias for the node stack used by in-process tests and demos.
pub type LoopbackNode = Node<LoopbackTransport>;
