// src/main.rs
//
// Minimal demo node that wires up the tera library:
//
// - RocksDB-backed store
// - interest filter + gatekeeper over a loopback transport
// - Prometheus metrics exporter on /metrics
// - a sample publish/extend/receive round trip, then periodic stats
//   until ctrl-c.
//
// The real gossip transport is an external collaborator; this binary
// exists to exercise the full admission and storage path end to end.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use tera::{
    InterestFilter, LoopbackTransport, MetricsRegistry, Node, NodeConfig,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "tera=info".to_string()))
        .init();

    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let cfg = NodeConfig::default();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Store + node
    // ---------------------------

    let store = tera::Store::open(&cfg.storage)
        .map_err(|e| format!("failed to open store at {}: {e}", cfg.storage.path.display()))?;

    let filter = InterestFilter::new(cfg.gossip.interests.iter(), cfg.gossip.params);
    let node = Node::new(store, filter, LoopbackTransport::new()).with_metrics(metrics);
    let shutdown = node.shutdown_handle();

    info!(
        interests = ?cfg.gossip.interests,
        threshold = cfg.gossip.params.threshold,
        "node started"
    );

    // ---------------------------
    // Sample round trip
    // ---------------------------

    let root = node
        .publish(b"Machine learning basics")
        .map_err(|e| format!("publish failed: {e}"))?;
    let ext = node
        .publish_extension(&root, b" and neural networks")
        .map_err(|e| format!("extend failed: {e}"))?;
    info!(root = %root, child = %ext.child.crypto, "published sample chain");

    // Feed the announced frames back through the admission path, as a
    // peer would receive them.
    for (_, frame) in node.transport().take_published() {
        match node.handle_message(&frame) {
            Ok(Some(decision)) => {
                info!(similarity = ?decision.similarity, "inbound extension admitted")
            }
            Ok(None) => info!("inbound extension blocked"),
            Err(e) => info!(error = %e, "inbound frame rejected"),
        }
    }

    let reconstructed = node
        .store()
        .reconstruct(&ext.child.crypto)
        .map_err(|e| format!("reconstruct failed: {e}"))?;
    info!(
        bytes = reconstructed.len(),
        content = %String::from_utf8_lossy(&reconstructed),
        "reconstructed chain content"
    );

    // ---------------------------
    // Stats loop until ctrl-c
    // ---------------------------

    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match node.stats() {
                    Ok(stats) => info!(
                        blocks = stats.store.block_count,
                        extensions = stats.store.extension_count,
                        seen = stats.gatekeeper.total_seen,
                        forwarded = stats.gatekeeper.forwarded,
                        "node stats"
                    ),
                    Err(e) => info!(error = %e, "stats unavailable"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                shutdown.trigger();
                break;
            }
        }
    }

    Ok(())
}
