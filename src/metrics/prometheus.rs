//! Prometheus-backed metrics and HTTP exporter.
//!
//! [`MetricsRegistry`] owns a Prometheus registry with strongly-typed
//! metric groups for the gatekeeper and the store, and an async HTTP
//! exporter serves `/metrics` in the Prometheus text format.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

use crate::gatekeeper::{Decision, RejectReason};
use crate::storage::StoreStats;

/// Gatekeeper decision metrics.
#[derive(Clone)]
pub struct GateMetrics {
    /// Total extensions evaluated.
    pub extensions_seen: IntCounter,
    /// Extensions rejected by the crypto gate.
    pub crypto_blocked: IntCounter,
    /// Extensions rejected by the semantic gate.
    pub semantic_blocked: IntCounter,
    /// Extensions admitted and re-announced.
    pub forwarded: IntCounter,
    /// Distribution of similarity scores that reached the semantic gate.
    pub similarity: Histogram,
}

impl GateMetrics {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let extensions_seen = IntCounter::with_opts(Opts::new(
            "gate_extensions_seen_total",
            "Total number of extensions evaluated by the gatekeeper",
        ))?;
        registry.register(Box::new(extensions_seen.clone()))?;

        let crypto_blocked = IntCounter::with_opts(Opts::new(
            "gate_crypto_blocked_total",
            "Extensions rejected because the homomorphic equality failed",
        ))?;
        registry.register(Box::new(crypto_blocked.clone()))?;

        let semantic_blocked = IntCounter::with_opts(Opts::new(
            "gate_semantic_blocked_total",
            "Extensions rejected because similarity fell below the threshold",
        ))?;
        registry.register(Box::new(semantic_blocked.clone()))?;

        let forwarded = IntCounter::with_opts(Opts::new(
            "gate_forwarded_total",
            "Extensions admitted and re-announced",
        ))?;
        registry.register(Box::new(forwarded.clone()))?;

        let similarity = Histogram::with_opts(
            HistogramOpts::new(
                "gate_similarity_score",
                "Similarity scores of extensions that passed the crypto gate",
            )
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        )?;
        registry.register(Box::new(similarity.clone()))?;

        Ok(Self {
            extensions_seen,
            crypto_blocked,
            semantic_blocked,
            forwarded,
            similarity,
        })
    }
}

/// Store-level metrics.
#[derive(Clone)]
pub struct StoreMetrics {
    /// Number of stored blocks.
    pub blocks: IntGauge,
    /// Number of stored extension records.
    pub extensions: IntGauge,
    /// Total stored bytes across all blocks.
    pub stored_bytes: IntGauge,
}

impl StoreMetrics {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks = IntGauge::with_opts(Opts::new(
            "store_blocks",
            "Number of content blocks currently stored",
        ))?;
        registry.register(Box::new(blocks.clone()))?;

        let extensions = IntGauge::with_opts(Opts::new(
            "store_extensions",
            "Number of extension records currently stored",
        ))?;
        registry.register(Box::new(extensions.clone()))?;

        let stored_bytes = IntGauge::with_opts(Opts::new(
            "store_bytes",
            "Total size of stored blocks in bytes",
        ))?;
        registry.register(Box::new(stored_bytes.clone()))?;

        Ok(Self {
            blocks,
            extensions,
            stored_bytes,
        })
    }
}

/// Wrapper around a Prometheus registry and the node's metric groups.
///
/// Wrap in an [`Arc`] and share across threads and tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub gate: GateMetrics,
    pub store: StoreMetrics,
}

impl MetricsRegistry {
    /// Creates a registry under the `tera` namespace with all metric
    /// groups registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tera".to_string()), None)?;
        let gate = GateMetrics::register(&registry)?;
        let store = StoreMetrics::register(&registry)?;
        Ok(Self {
            registry,
            gate,
            store,
        })
    }

    /// Records one gatekeeper decision.
    pub fn record_decision(&self, decision: &Decision) {
        self.gate.extensions_seen.inc();
        match decision.reason {
            Some(RejectReason::Crypto) => self.gate.crypto_blocked.inc(),
            Some(RejectReason::Semantic) => self.gate.semantic_blocked.inc(),
            None => self.gate.forwarded.inc(),
        }
        if let Some(similarity) = decision.similarity {
            self.gate.similarity.observe(similarity);
        }
    }

    /// Mirrors a store statistics snapshot into the gauges.
    pub fn record_store_stats(&self, stats: &StoreStats) {
        self.store.blocks.set(stats.block_count as i64);
        self.store.extensions.set(stats.extension_count as i64);
        self.store.stored_bytes.set(stats.total_size as i64);
    }

    /// Encodes all metrics in the Prometheus text exposition format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server exposing `GET /metrics`; all other paths 404.
///
/// Intended to be spawned onto a Tokio runtime:
///
/// ```ignore
/// let metrics = Arc::new(MetricsRegistry::new()?);
/// tokio::spawn(run_prometheus_http_server(metrics.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { handle_request(req, metrics) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(error = %e, "metrics connection error");
            }
        });
    }
}

fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(metrics.gather_text()))),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new())),
    };
    Ok(response.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Extension};
    use crate::gatekeeper::Gatekeeper;
    use crate::semantic::KernelParams;

    #[test]
    fn decisions_are_mirrored_into_counters() {
        let metrics = MetricsRegistry::new().unwrap();
        let gk = Gatekeeper::new();

        let parent = Content::new("machine learning");
        let ext = Extension::from_parent(&parent, " models");
        let query = crate::content::Query::new(
            "machine learning",
            KernelParams {
                threshold: 0.3,
                ..KernelParams::default()
            },
        );

        let decision = gk.should_forward(&ext, &query);
        metrics.record_decision(&decision);

        assert_eq!(metrics.gate.extensions_seen.get(), 1);
        assert_eq!(metrics.gate.forwarded.get(), 1);
        assert_eq!(metrics.gate.crypto_blocked.get(), 0);
    }

    #[test]
    fn gather_text_includes_registered_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.gate.extensions_seen.inc();

        let text = metrics.gather_text();
        assert!(text.contains("tera_gate_extensions_seen_total"));
        assert!(text.contains("tera_store_blocks"));
    }

    #[test]
    fn store_stats_set_the_gauges() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_store_stats(&StoreStats {
            block_count: 3,
            extension_count: 2,
            total_size: 128,
            path: None,
        });

        assert_eq!(metrics.store.blocks.get(), 3);
        assert_eq!(metrics.store.extensions.get(), 2);
        assert_eq!(metrics.store.stored_bytes.get(), 128);
    }
}
