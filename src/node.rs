//! The boundary node.
//!
//! [`Node`] wires the store, the gatekeeper, and an interest profile to
//! an external [`Transport`]. The transport is deliberately narrow (it
//! delivers opaque frames on a topic and knows its peers), so gossip
//! implementations can be swapped without touching the core.
//!
//! Long-running operations observe a [`ShutdownHandle`] and abort at the
//! next transaction boundary once it is triggered.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::content::{Content, Extension, Query};
use crate::crypto::GroupHash;
use crate::error::Error;
use crate::gatekeeper::{Decision, Gatekeeper, GatekeeperStats, InterestFilter};
use crate::metrics::MetricsRegistry;
use crate::protocol::{Message, MessageType, QueryPayload, TOPIC_EXTENSIONS};
use crate::semantic;
use crate::storage::{BackendError, ExtensionRecord, Store, StoreStats};

/// Interface the external gossip layer must satisfy.
pub trait Transport: Send + Sync {
    /// Publishes a frame on a topic.
    fn publish(&self, topic: &str, frame: &[u8]) -> Result<(), Error>;

    /// Currently connected peers, as display strings.
    fn peers(&self) -> Vec<String>;
}

/// In-process transport that records published frames.
///
/// Serves tests and single-process demos; frames do not leave the
/// process.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl LoopbackTransport {
    pub fn new() -> LoopbackTransport {
        LoopbackTransport::default()
    }

    /// Drains and returns everything published so far.
    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().map(|mut p| p.split_off(0)).unwrap_or_default()
    }
}

impl Transport for LoopbackTransport {
    fn publish(&self, topic: &str, frame: &[u8]) -> Result<(), Error> {
        self.published
            .lock()
            .map_err(|_| Error::from(BackendError::Poisoned("loopback transport")))?
            .push((topic.to_string(), frame.to_vec()));
        Ok(())
    }

    fn peers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Cancellation flag shared between a node and its driver.
///
/// Triggering is sticky; operations in flight abort at their next
/// transaction boundary or publish.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> ShutdownHandle {
        ShutdownHandle::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Combined node statistics.
#[derive(Clone, Debug)]
pub struct NodeStats {
    pub gatekeeper: GatekeeperStats,
    pub store: StoreStats,
}

/// A store-backed participant: admits inbound extensions through the
/// gatekeeper, persists what passes, and re-announces it.
pub struct Node<T: Transport> {
    store: Store,
    gatekeeper: Gatekeeper,
    filter: InterestFilter,
    transport: T,
    shutdown: ShutdownHandle,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<T: Transport> Node<T> {
    pub fn new(store: Store, filter: InterestFilter, transport: T) -> Node<T> {
        Node {
            store,
            gatekeeper: Gatekeeper::new(),
            filter,
            transport,
            shutdown: ShutdownHandle::new(),
            metrics: None,
        }
    }

    /// Attaches a metrics registry; decisions and store stats will be
    /// recorded into it.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Node<T> {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle for cancelling this node's operations.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Triggers shutdown; subsequent operations abort.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Connected peers, per the transport.
    pub fn peers(&self) -> Vec<String> {
        self.transport.peers()
    }

    /// Publishes new root content.
    ///
    /// The content is stored as a root and announced as an extension of
    /// the identity hash, so receivers can verify it with the same
    /// homomorphic check as any other edge.
    pub fn publish(&self, data: &[u8]) -> Result<GroupHash, Error> {
        self.check_running()?;
        let content = Content::new(data.to_vec());
        let hash = self.store.put_content(&content.data)?;

        let announcement = Extension {
            parent: crate::content::DualHash {
                crypto: GroupHash::ZERO,
                semantic: Default::default(),
            },
            delta: content.data.clone(),
            child: content.dual_hash(),
            timestamp: Some(unix_now()),
            publisher: None,
        };

        self.check_running()?;
        let frame = Message::extension(&announcement)?.encode()?;
        self.transport.publish(TOPIC_EXTENSIONS, &frame)?;

        self.record_store_stats();
        Ok(hash)
    }

    /// Extends existing content and announces the extension.
    pub fn publish_extension(
        &self,
        parent: &GroupHash,
        delta: &[u8],
    ) -> Result<Extension, Error> {
        self.check_running()?;

        // The parent's features describe its full reconstructed bytes;
        // its crypto hash is the stored chain hash, not the element hash
        // of those bytes.
        let parent_bytes = self.store.reconstruct(parent)?;
        let parent_content = Content {
            crypto: *parent,
            semantic: semantic::extract(&parent_bytes),
            data: parent_bytes,
        };

        let mut ext = Extension::from_parent(&parent_content, delta);
        ext.timestamp = Some(unix_now());

        self.store.put_extension(&ext)?;

        self.check_running()?;
        let frame = Message::extension(&ext)?.encode()?;
        self.transport.publish(TOPIC_EXTENSIONS, &frame)?;

        self.record_store_stats();
        Ok(ext)
    }

    /// Processes one inbound frame.
    ///
    /// Extensions run the two-gate admission against every interest; an
    /// admitted extension is persisted and re-announced, and its decision
    /// is returned. Queries are answered with ranked matches. Returns
    /// `Ok(None)` when nothing was admitted.
    pub fn handle_message(&self, frame: &[u8]) -> Result<Option<Decision>, Error> {
        self.check_running()?;
        let msg = Message::decode(frame)?;

        match msg.kind {
            MessageType::Extension => {
                let ext: Extension = msg.extension_payload()?.into();
                self.handle_extension(ext, frame)
            }
            MessageType::Query => {
                let payload = msg.query_payload()?;
                payload.params.validate()?;
                let response = self.answer_query(&payload)?;
                self.transport.publish(TOPIC_EXTENSIONS, &response.encode()?)?;
                Ok(None)
            }
            MessageType::QueryResponse => {
                let payload = msg.query_response_payload()?;
                debug!(
                    request_id = %payload.request_id,
                    matches = payload.matches.len(),
                    "received query response"
                );
                Ok(None)
            }
        }
    }

    fn handle_extension(
        &self,
        ext: Extension,
        frame: &[u8],
    ) -> Result<Option<Decision>, Error> {
        let mut admitted = None;
        for query in self.filter.queries() {
            let decision = self.gatekeeper.should_forward(&ext, query);
            if let Some(metrics) = &self.metrics {
                metrics.record_decision(&decision);
            }
            if decision.forward {
                admitted = Some(decision);
                break;
            }
        }

        let Some(decision) = admitted else {
            debug!(child = %ext.child.crypto, "extension blocked by gatekeeping");
            return Ok(None);
        };

        // A zero parent announces root content; anything else is an edge.
        if ext.parent.crypto.is_zero() {
            self.store.put_content(&ext.delta)?;
        } else {
            self.store.put_extension(&ext)?;
        }

        self.check_running()?;
        self.transport.publish(TOPIC_EXTENSIONS, frame)?;
        self.record_store_stats();
        Ok(Some(decision))
    }

    /// Ranks stored extensions against the query and builds the response.
    fn answer_query(&self, payload: &QueryPayload) -> Result<Message, Error> {
        let query = Query::new(payload.content.clone(), payload.params);
        let records = self.store.extension_records()?;

        let candidates: Vec<_> = records
            .iter()
            .map(|r| r.child_dual_hash.semantic.clone())
            .collect();
        let ranked = semantic::rank_by_similarity(&query.features, &candidates, query.params);

        let mut matches = Vec::new();
        for result in ranked {
            if result.similarity < query.params.threshold {
                break;
            }
            match self.record_to_extension(&records[result.index]) {
                Ok(ext) => matches.push(ext),
                Err(e) => {
                    warn!(
                        child = %records[result.index].child,
                        error = %e,
                        "skipping unresolvable match"
                    );
                }
            }
        }

        debug!(
            request_id = %payload.request_id,
            matches = matches.len(),
            "answering query"
        );
        Message::query_response(payload.request_id.clone(), &matches)
    }

    /// Rebuilds a full [`Extension`] from a stored record; the parent's
    /// features are recomputed from its reconstructed bytes.
    fn record_to_extension(&self, record: &ExtensionRecord) -> Result<Extension, Error> {
        let parent_bytes = self.store.reconstruct(&record.parent)?;
        Ok(Extension {
            parent: crate::content::DualHash {
                crypto: record.parent,
                semantic: semantic::extract(&parent_bytes),
            },
            delta: record.delta.clone(),
            child: record.child_dual_hash.clone(),
            timestamp: record.timestamp,
            publisher: record.publisher.clone(),
        })
    }

    /// Current gatekeeper and store statistics.
    pub fn stats(&self) -> Result<NodeStats, Error> {
        Ok(NodeStats {
            gatekeeper: self.gatekeeper.stats(),
            store: self.store.stats()?,
        })
    }

    fn record_store_stats(&self) {
        if let Some(metrics) = &self.metrics {
            if let Ok(stats) = self.store.stats() {
                metrics.record_store_stats(&stats);
            }
        }
    }

    fn check_running(&self) -> Result<(), Error> {
        if self.shutdown.is_triggered() {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "node is shut down",
            ))
            .into());
        }
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::KernelParams;

    fn test_node(interests: &[&str], threshold: f64) -> Node<LoopbackTransport> {
        let params = KernelParams {
            threshold,
            ..KernelParams::default()
        };
        Node::new(
            Store::in_memory(),
            InterestFilter::new(interests.iter().copied(), params),
            LoopbackTransport::new(),
        )
    }

    #[test]
    fn publish_stores_and_announces_root_content() {
        let node = test_node(&["anything"], 0.3);
        let hash = node.publish(b"Machine learning basics").unwrap();

        assert!(node.store().has_content(&hash).unwrap());

        let published = node.transport.take_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TOPIC_EXTENSIONS);

        let msg = Message::decode(&published[0].1).unwrap();
        let payload = msg.extension_payload().unwrap();
        assert!(payload.parent_crypto.is_zero());
        assert_eq!(payload.new_crypto, hash);
    }

    #[test]
    fn publish_extension_extends_stored_content() {
        let node = test_node(&["machine learning"], 0.3);
        let root = node.publish(b"Machine learning basics").unwrap();
        node.transport.take_published();

        let ext = node
            .publish_extension(&root, b" and neural networks")
            .unwrap();
        assert!(ext.verify_crypto());
        assert_eq!(
            node.store().reconstruct(&ext.child.crypto).unwrap(),
            b"Machine learning basics and neural networks"
        );
        assert_eq!(node.transport.take_published().len(), 1);
    }

    #[test]
    fn relevant_inbound_extension_is_admitted_and_forwarded() {
        let publisher = test_node(&["anything"], 0.9);
        let root = publisher.publish(b"Machine learning basics").unwrap();
        let ext = publisher
            .publish_extension(&root, b" and neural networks")
            .unwrap();
        let frames = publisher.transport.take_published();

        let receiver = test_node(&["machine learning"], 0.3);
        // Deliver the root announcement, then the extension.
        for (_, frame) in &frames {
            receiver.handle_message(frame).unwrap();
        }

        assert!(receiver.store().has_content(&root).unwrap());
        assert!(receiver.store().get_extension(&ext.child.crypto).is_ok());
        assert_eq!(
            receiver.store().reconstruct(&ext.child.crypto).unwrap(),
            b"Machine learning basics and neural networks"
        );
        // Both admitted frames were re-announced.
        assert_eq!(receiver.transport.take_published().len(), 2);
        assert_eq!(receiver.gatekeeper().stats().forwarded, 2);
    }

    #[test]
    fn irrelevant_inbound_extension_is_not_stored() {
        let publisher = test_node(&["anything"], 0.9);
        let root = publisher.publish(b"cooking recipes").unwrap();
        publisher.publish_extension(&root, b" for Italian pasta").unwrap();
        let frames = publisher.transport.take_published();

        let receiver = test_node(&["machine learning algorithms"], 0.5);
        for (_, frame) in &frames {
            let decision = receiver.handle_message(frame).unwrap();
            assert!(decision.is_none());
        }

        assert!(!receiver.store().has_content(&root).unwrap());
        assert!(receiver.transport.take_published().is_empty());

        let stats = receiver.gatekeeper().stats();
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.semantic_blocked, stats.total_seen);
    }

    #[test]
    fn queries_are_answered_with_ranked_matches() {
        let node = test_node(&["machine learning"], 0.2);
        let root = node.publish(b"Machine learning basics").unwrap();
        node.publish_extension(&root, b" and neural networks").unwrap();
        node.transport.take_published();

        let query = Query::new(
            "machine learning",
            KernelParams {
                threshold: 0.2,
                ..KernelParams::default()
            },
        );
        let frame = Message::query(&query, "req-1").unwrap().encode().unwrap();
        node.handle_message(&frame).unwrap();

        let published = node.transport.take_published();
        assert_eq!(published.len(), 1);
        let response = Message::decode(&published[0].1).unwrap();
        let payload = response.query_response_payload().unwrap();
        assert_eq!(payload.request_id, "req-1");
        assert_eq!(payload.matches.len(), 1);
    }

    #[test]
    fn invalid_query_parameters_are_rejected() {
        let node = test_node(&["x"], 0.3);
        let query = Query::new(
            "q",
            KernelParams {
                threshold: 2.0,
                ..KernelParams::default()
            },
        );
        let frame = Message::query(&query, "req-bad").unwrap().encode().unwrap();
        assert!(matches!(
            node.handle_message(&frame),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn shutdown_aborts_operations() {
        let node = test_node(&["x"], 0.3);
        let handle = node.shutdown_handle();
        assert!(!handle.is_triggered());

        node.shutdown();
        assert!(handle.is_triggered());
        assert!(node.publish(b"too late").is_err());
        assert!(node.handle_message(b"{}").is_err());
    }

    #[test]
    fn stats_combine_gatekeeper_and_store() {
        let node = test_node(&["machine learning"], 0.3);
        node.publish(b"machine learning").unwrap();

        let stats = node.stats().unwrap();
        assert_eq!(stats.store.block_count, 1);
        assert_eq!(stats.gatekeeper.total_seen, 0);
    }
}
