//! Dual-hashed content.
//!
//! Every piece of content carries two fingerprints of the same bytes: a
//! [`GroupHash`] for integrity and a [`Features`] record for meaning.
//! The pair is a [`DualHash`]; an [`Extension`] links the dual hashes of
//! a parent and a child through the delta bytes between them.

use serde::{Deserialize, Serialize};

use crate::crypto::{self, GroupHash};
use crate::semantic::{self, Features, KernelParams};

/// The two fingerprints of one piece of content, without the bytes.
///
/// This is what travels in records and messages: enough to verify an
/// extension and to judge relevance, without shipping the content itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DualHash {
    /// Cryptographic identity under the homomorphic hash.
    pub crypto: GroupHash,
    /// Semantic fingerprint of the same bytes.
    pub semantic: Features,
}

/// Raw content bytes together with their dual hash.
#[derive(Clone, Debug, PartialEq)]
pub struct Content {
    pub data: Vec<u8>,
    pub crypto: GroupHash,
    pub semantic: Features,
}

impl Content {
    /// Builds content from raw bytes, computing both hash halves.
    pub fn new(data: impl Into<Vec<u8>>) -> Content {
        let data = data.into();
        Content {
            crypto: crypto::hash_element(&data),
            semantic: semantic::extract(&data),
            data,
        }
    }

    /// Extends this content with additional bytes.
    ///
    /// The crypto hash is extended in O(1); features are re-extracted
    /// from the combined bytes.
    pub fn extend(&self, delta: &[u8]) -> Content {
        let mut combined = self.data.clone();
        combined.extend_from_slice(delta);
        Content {
            crypto: crypto::extend(&self.crypto, delta),
            semantic: semantic::extract(&combined),
            data: combined,
        }
    }

    /// Returns the dual hash of this content.
    pub fn dual_hash(&self) -> DualHash {
        DualHash {
            crypto: self.crypto,
            semantic: self.semantic.clone(),
        }
    }

    /// Similarity of this content to another under the given parameters.
    pub fn similarity(&self, other: &Content, params: KernelParams) -> f64 {
        semantic::similarity(&self.semantic, &other.semantic, params)
    }
}

/// An extension announcement: parent, delta, and the resulting child.
///
/// The defining invariant is
/// `child.crypto == parent.crypto + hash_element(delta)`, which
/// [`Extension::verify_crypto`] checks without any stored state.
#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
    /// Dual hash of the parent content.
    pub parent: DualHash,
    /// Bytes appended to the parent.
    pub delta: Vec<u8>,
    /// Dual hash of the extended content.
    pub child: DualHash,
    /// Publication time, unix seconds.
    pub timestamp: Option<i64>,
    /// Free-form publisher identity.
    pub publisher: Option<String>,
}

impl Extension {
    /// Builds a valid extension of `parent` by `delta`.
    pub fn from_parent(parent: &Content, delta: impl Into<Vec<u8>>) -> Extension {
        let delta = delta.into();
        let child = parent.extend(&delta);
        Extension {
            parent: parent.dual_hash(),
            delta,
            child: child.dual_hash(),
            timestamp: None,
            publisher: None,
        }
    }

    /// Checks the homomorphic equality between parent, delta, and child.
    pub fn verify_crypto(&self) -> bool {
        crypto::verify_extension(&self.parent.crypto, &self.child.crypto, &self.delta)
    }

    /// Similarity of the extended content to a query's features.
    pub fn similarity_to(&self, query: &Features, params: KernelParams) -> f64 {
        semantic::similarity(&self.child.semantic, query, params)
    }

    /// Threshold test against a query's features.
    pub fn is_relevant_to(&self, query: &Features, params: KernelParams) -> bool {
        semantic::is_relevant(&self.child.semantic, query, params)
    }
}

/// A semantic search query: content to match against, plus the kernel
/// parameters expressing what "similar" means for this query.
#[derive(Clone, Debug)]
pub struct Query {
    pub content: Vec<u8>,
    pub features: Features,
    pub params: KernelParams,
}

impl Query {
    /// Builds a query from content bytes and explicit parameters.
    ///
    /// Parameters are taken as-is; boundary layers validate them before
    /// they reach a query.
    pub fn new(content: impl Into<Vec<u8>>, params: KernelParams) -> Query {
        let content = content.into();
        Query {
            features: semantic::extract(&content),
            content,
            params,
        }
    }

    /// Builds a query with the default parameters.
    pub fn with_defaults(content: impl Into<Vec<u8>>) -> Query {
        Query::new(content, KernelParams::default())
    }

    /// Whether the given features match this query.
    pub fn matches(&self, candidate: &Features) -> bool {
        semantic::is_relevant(candidate, &self.features, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_element;

    #[test]
    fn new_content_hashes_both_halves() {
        let content = Content::new("hello world");
        assert_eq!(content.crypto, hash_element(b"hello world"));
        assert!(content.semantic.tf.contains_key("hello"));
    }

    #[test]
    fn extend_produces_the_combined_content() {
        let root = Content::new("Hello");
        let extended = root.extend(b" World");

        assert_eq!(extended.data, b"Hello World");
        assert_eq!(extended.crypto, crypto::extend(&root.crypto, b" World"));
        assert!(extended.semantic.tf.contains_key("world"));
    }

    #[test]
    fn extension_from_parent_verifies() {
        let parent = Content::new("base document");
        let ext = Extension::from_parent(&parent, " with more text");
        assert!(ext.verify_crypto());
    }

    #[test]
    fn forged_child_hash_fails_verification() {
        let parent = Content::new("legitimate root");
        let mut ext = Extension::from_parent(&parent, " addition");
        ext.child.crypto = hash_element(b"completely different content");
        assert!(!ext.verify_crypto());
    }

    #[test]
    fn query_matches_similar_content() {
        let query = Query::new(
            "machine learning",
            KernelParams {
                threshold: 0.3,
                ..KernelParams::default()
            },
        );
        let close = Content::new("machine learning basics");
        let far = Content::new("gardening tips");

        assert!(query.matches(&close.semantic));
        assert!(!query.matches(&far.semantic));
    }
}
