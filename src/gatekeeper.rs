//! Two-gate admission policy.
//!
//! An inbound extension is admitted only if it passes both gates:
//!
//! 1. crypto: the claimed child hash really is the parent extended by
//!    the delta,
//! 2. semantic: the extended content is similar enough to what this
//!    node cares about.
//!
//! Gate 1 makes spam expensive (an extension must build on real content);
//! gate 2 keeps irrelevant-but-valid content from propagating. The
//! gatekeeper itself never fails: an invalid extension is a counted
//! decision, not an error.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::content::{Extension, Query};
use crate::semantic::KernelParams;

/// Which gate blocked an extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The homomorphic equality failed.
    Crypto,
    /// Similarity fell below the query threshold.
    Semantic,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Crypto => f.write_str("crypto"),
            RejectReason::Semantic => f.write_str("semantic"),
        }
    }
}

/// Outcome of one gatekeeping decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Whether the extension should be admitted and re-announced.
    pub forward: bool,
    /// Set when blocked; names the gate that rejected.
    pub reason: Option<RejectReason>,
    /// Result of the crypto gate.
    pub crypto_valid: bool,
    /// Result of the semantic gate. Always `false` when the crypto gate
    /// already blocked.
    pub semantic_relevant: bool,
    /// Similarity score, present once the semantic gate has run.
    pub similarity: Option<f64>,
}

/// Snapshot of gatekeeper counters.
///
/// `total_seen` always equals the sum of the other three.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatekeeperStats {
    pub total_seen: u64,
    pub crypto_blocked: u64,
    pub semantic_blocked: u64,
    pub forwarded: u64,
    pub block_rate: f64,
}

/// The admission gatekeeper.
///
/// Stateless apart from monotonically increasing counters, which are
/// updated atomically so the gatekeeper can be shared across threads
/// without locks.
#[derive(Debug, Default)]
pub struct Gatekeeper {
    total_seen: AtomicU64,
    crypto_blocked: AtomicU64,
    semantic_blocked: AtomicU64,
    forwarded: AtomicU64,
}

impl Gatekeeper {
    pub fn new() -> Gatekeeper {
        Gatekeeper::default()
    }

    /// Runs both gates against an extension and records the decision.
    pub fn should_forward(&self, ext: &Extension, query: &Query) -> Decision {
        self.total_seen.fetch_add(1, Ordering::Relaxed);

        if !ext.verify_crypto() {
            self.crypto_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(RejectReason::Crypto),
                crypto_valid: false,
                semantic_relevant: false,
                similarity: None,
            };
        }

        let similarity = ext.similarity_to(&query.features, query.params);
        if similarity < query.params.threshold {
            self.semantic_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(RejectReason::Semantic),
                crypto_valid: true,
                semantic_relevant: false,
                similarity: Some(similarity),
            };
        }

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Decision {
            forward: true,
            reason: None,
            crypto_valid: true,
            semantic_relevant: true,
            similarity: Some(similarity),
        }
    }

    /// Returns a snapshot of the decision counters.
    pub fn stats(&self) -> GatekeeperStats {
        let total_seen = self.total_seen.load(Ordering::Relaxed);
        let crypto_blocked = self.crypto_blocked.load(Ordering::Relaxed);
        let semantic_blocked = self.semantic_blocked.load(Ordering::Relaxed);
        let forwarded = self.forwarded.load(Ordering::Relaxed);

        let block_rate = if total_seen > 0 {
            (crypto_blocked + semantic_blocked) as f64 / total_seen as f64
        } else {
            0.0
        };

        GatekeeperStats {
            total_seen,
            crypto_blocked,
            semantic_blocked,
            forwarded,
            block_rate,
        }
    }

    /// Clears all counters.
    pub fn reset(&self) {
        self.total_seen.store(0, Ordering::Relaxed);
        self.crypto_blocked.store(0, Ordering::Relaxed);
        self.semantic_blocked.store(0, Ordering::Relaxed);
        self.forwarded.store(0, Ordering::Relaxed);
    }
}

/// A node's interest profile: interest strings with the parameters used
/// to match content against them.
///
/// Interest features are extracted once at construction; matching an
/// inbound extension costs only kernel evaluations.
#[derive(Clone, Debug)]
pub struct InterestFilter {
    queries: Vec<Query>,
}

impl InterestFilter {
    /// Builds a filter from interest strings and shared parameters.
    pub fn new<I, S>(interests: I, params: KernelParams) -> InterestFilter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        InterestFilter {
            queries: interests
                .into_iter()
                .map(|interest| Query::new(interest.as_ref().as_bytes().to_vec(), params))
                .collect(),
        }
    }

    /// The queries derived from the interest strings.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Whether any interest matches the given features.
    pub fn matches(&self, candidate: &crate::semantic::Features) -> bool {
        self.queries.iter().any(|q| q.matches(candidate))
    }

    /// Runs the gatekeeper against each interest in turn; the extension is
    /// admitted on the first interest that passes both gates. Returns the
    /// admitting decision, or `None` when every interest blocked.
    pub fn admit(&self, gatekeeper: &Gatekeeper, ext: &Extension) -> Option<Decision> {
        self.queries
            .iter()
            .map(|query| gatekeeper.should_forward(ext, query))
            .find(|decision| decision.forward)
    }
}

/// One participant of an in-process propagation run: an interest profile,
/// its own gatekeeper, and the extensions it admitted.
#[derive(Debug)]
pub struct InterestNode {
    pub id: String,
    pub filter: InterestFilter,
    pub gatekeeper: Gatekeeper,
    pub received: Vec<Extension>,
}

impl InterestNode {
    pub fn new<I, S>(id: impl Into<String>, interests: I, params: KernelParams) -> InterestNode
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        InterestNode {
            id: id.into(),
            filter: InterestFilter::new(interests, params),
            gatekeeper: Gatekeeper::new(),
            received: Vec::new(),
        }
    }

    /// Processes one inbound extension; returns whether this node would
    /// forward it to its peers.
    pub fn process(&mut self, ext: &Extension) -> bool {
        for query in self.filter.queries() {
            if self.gatekeeper.should_forward(ext, query).forward {
                self.received.push(ext.clone());
                return true;
            }
        }
        false
    }
}

/// Propagates an extension across a set of nodes; each node decides
/// independently. Returns how many nodes forwarded it.
pub fn propagate(nodes: &mut [InterestNode], ext: &Extension) -> usize {
    nodes
        .iter_mut()
        .fold(0, |acc, node| acc + node.process(ext) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::crypto::hash_element;

    fn query(text: &str, threshold: f64) -> Query {
        Query::new(
            text.as_bytes().to_vec(),
            KernelParams {
                threshold,
                ..KernelParams::default()
            },
        )
    }

    #[test]
    fn valid_relevant_extension_is_forwarded() {
        let gk = Gatekeeper::new();
        let parent = Content::new("Machine learning basics");
        let ext = Extension::from_parent(&parent, " and neural networks");

        let decision = gk.should_forward(&ext, &query("machine learning", 0.3));

        assert!(decision.forward);
        assert!(decision.crypto_valid);
        assert!(decision.similarity.unwrap() >= 0.3);
        assert_eq!(decision.reason, None);
        assert_eq!(gk.stats().forwarded, 1);
    }

    #[test]
    fn forged_extension_is_blocked_at_the_crypto_gate() {
        let gk = Gatekeeper::new();
        let parent = Content::new("legitimate root");
        let mut ext = Extension::from_parent(&parent, " data");
        ext.child.crypto = hash_element(b"completely different content");

        let decision = gk.should_forward(&ext, &query("legitimate", 0.1));

        assert!(!decision.forward);
        assert_eq!(decision.reason, Some(RejectReason::Crypto));
        assert_eq!(decision.reason.unwrap().to_string(), "crypto");
        assert!(!decision.crypto_valid);
        assert_eq!(decision.similarity, None);
        assert_eq!(gk.stats().crypto_blocked, 1);
    }

    #[test]
    fn irrelevant_extension_is_blocked_at_the_semantic_gate() {
        let gk = Gatekeeper::new();
        let parent = Content::new("cooking recipes");
        let ext = Extension::from_parent(&parent, " for Italian pasta");

        let decision = gk.should_forward(&ext, &query("machine learning algorithms", 0.5));

        assert!(!decision.forward);
        assert_eq!(decision.reason, Some(RejectReason::Semantic));
        assert_eq!(decision.reason.unwrap().to_string(), "semantic");
        assert!(decision.crypto_valid);
        assert!(decision.similarity.unwrap() < 0.5);
        assert_eq!(gk.stats().semantic_blocked, 1);
    }

    #[test]
    fn counters_partition_total_seen() {
        let gk = Gatekeeper::new();
        let parent = Content::new("machine learning");

        let good = Extension::from_parent(&parent, " models");
        let mut forged = Extension::from_parent(&parent, " models");
        forged.child.crypto = hash_element(b"junk");
        let off_topic = Extension::from_parent(&parent, " zzz");

        let q = query("machine learning", 0.3);
        gk.should_forward(&good, &q);
        gk.should_forward(&forged, &q);
        gk.should_forward(&off_topic, &query("totally unrelated gardening", 0.9));

        let stats = gk.stats();
        assert_eq!(
            stats.total_seen,
            stats.crypto_blocked + stats.semantic_blocked + stats.forwarded
        );
        assert_eq!(stats.total_seen, 3);
        assert!(stats.block_rate > 0.0);

        gk.reset();
        assert_eq!(gk.stats(), GatekeeperStats::default());
    }

    #[test]
    fn admit_stops_at_the_first_forwarding_interest() {
        let params = KernelParams {
            threshold: 0.3,
            ..KernelParams::default()
        };
        let filter = InterestFilter::new(["gardening", "machine learning"], params);
        let gk = Gatekeeper::new();

        let parent = Content::new("Machine learning basics");
        let ext = Extension::from_parent(&parent, " and neural networks");

        let decision = filter.admit(&gk, &ext).expect("second interest admits");
        assert!(decision.forward);

        let off_topic = Extension::from_parent(&Content::new("stock market report"), " update");
        assert!(filter.admit(&gk, &off_topic).is_none());
    }

    #[test]
    fn interest_filter_is_an_or_over_interests() {
        let params = KernelParams {
            threshold: 0.3,
            ..KernelParams::default()
        };
        let filter = InterestFilter::new(["machine learning", "cooking recipes"], params);

        let ml = Content::new("machine learning basics");
        let cooking = Content::new("cooking recipes for pasta");
        let other = Content::new("quarterly financial report");

        assert!(filter.matches(&ml.semantic));
        assert!(filter.matches(&cooking.semantic));
        assert!(!filter.matches(&other.semantic));
    }

    #[test]
    fn propagation_counts_forwarding_nodes() {
        let params = KernelParams {
            threshold: 0.3,
            ..KernelParams::default()
        };
        let mut nodes = vec![
            InterestNode::new("ml", ["machine learning"], params),
            InterestNode::new("food", ["cooking recipes"], params),
            InterestNode::new("both", ["machine learning", "cooking"], params),
        ];

        let parent = Content::new("Machine learning basics");
        let ext = Extension::from_parent(&parent, " and neural networks");

        let forwarded = propagate(&mut nodes, &ext);
        assert_eq!(forwarded, 2);
        assert_eq!(nodes[0].received.len(), 1);
        assert!(nodes[1].received.is_empty());
    }
}
