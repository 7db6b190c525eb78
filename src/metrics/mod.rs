//! Metrics and instrumentation.
//!
//! Prometheus-compatible metrics for gatekeeping decisions and store
//! contents, plus a small HTTP exporter serving `/metrics`.
//!
//! Typical usage in a node binary:
//!
//! ```ignore
//! let metrics = Arc::new(MetricsRegistry::new()?);
//! tokio::spawn(run_prometheus_http_server(metrics.clone(), addr));
//! ```

pub mod prometheus;

pub use prometheus::{GateMetrics, MetricsRegistry, StoreMetrics, run_prometheus_http_server};
