//! The homomorphic set hash.
//!
//! The hash of a set of byte strings is the sum of the per-element hashes
//! in the group:
//!
//! ```text
//! H({e1, ..., en}) = e(e1) + ... + e(en)   (mod p)
//! ```
//!
//! which makes extension O(1): appending an element to a hashed set costs
//! one digest and one group addition, and any claimed extension can be
//! checked without access to the original set.

use sha3::{Digest, Sha3_256};

use super::group::GroupHash;

/// Hashes a single element into the group.
///
/// The element is digested with SHA3-256 and the digest, read as a
/// big-endian integer, is reduced modulo the group order. The digest
/// choice is part of the persisted data format and must not vary across
/// nodes.
pub fn hash_element(data: &[u8]) -> GroupHash {
    let digest = Sha3_256::digest(data);
    GroupHash::reduce(digest.into())
}

/// Hashes a set of elements: the group sum of their element hashes.
///
/// Commutative and associative; the empty set hashes to the identity.
pub fn hash_set<I>(elements: I) -> GroupHash
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    elements
        .into_iter()
        .fold(GroupHash::ZERO, |acc, e| acc.add(&hash_element(e.as_ref())))
}

/// Computes `H(A ∪ {delta})` from `H(A)` in O(1).
pub fn extend(old: &GroupHash, delta: &[u8]) -> GroupHash {
    old.add(&hash_element(delta))
}

/// Combines the hashes of two disjoint sets: `H(A ∪ B) = H(A) + H(B)`.
pub fn combine(a: &GroupHash, b: &GroupHash) -> GroupHash {
    a.add(b)
}

/// Checks that `new` is exactly `old` extended by `delta`.
pub fn verify_extension(old: &GroupHash, new: &GroupHash, delta: &[u8]) -> bool {
    extend(old, delta) == *new
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_hash_is_deterministic() {
        assert_eq!(hash_element(b"hello world"), hash_element(b"hello world"));
        assert_ne!(hash_element(b"hello"), hash_element(b"world"));
    }

    #[test]
    fn element_hash_matches_known_vectors() {
        // SHA3-256 of the empty string and of "abc"; both digests are
        // below the group order, so the reduction leaves them unchanged.
        assert_eq!(
            hash_element(b"").to_hex(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        assert_eq!(
            hash_element(b"abc").to_hex(),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn set_hash_is_commutative() {
        let h1 = hash_set([b"a".as_slice(), b"b", b"c"]);
        let h2 = hash_set([b"c".as_slice(), b"a", b"b"]);
        let h3 = hash_set([b"b".as_slice(), b"c", b"a"]);
        assert_eq!(h1, h2);
        assert_eq!(h1, h3);
    }

    #[test]
    fn empty_set_hashes_to_the_identity() {
        let empty: [&[u8]; 0] = [];
        assert_eq!(hash_set(empty), GroupHash::ZERO);
    }

    #[test]
    fn union_of_disjoint_sets_is_the_sum() {
        let a = hash_set([b"doc1".as_slice(), b"doc2"]);
        let b = hash_set([b"doc3".as_slice(), b"doc4"]);
        let ab = hash_set([b"doc1".as_slice(), b"doc2", b"doc3", b"doc4"]);
        assert_eq!(combine(&a, &b), ab);
    }

    #[test]
    fn extend_matches_the_full_set_hash() {
        let initial = hash_set([b"a".as_slice(), b"b"]);
        let extended = extend(&initial, b"c");
        assert_eq!(extended, hash_set([b"a".as_slice(), b"b", b"c"]));
    }

    #[test]
    fn extending_the_identity_gives_the_element_hash() {
        assert_eq!(extend(&GroupHash::ZERO, b"doc"), hash_element(b"doc"));
    }

    #[test]
    fn chained_extensions_match_the_set_hash() {
        let mut h = GroupHash::ZERO;
        h = extend(&h, b"doc1");
        h = extend(&h, b"doc2");
        h = extend(&h, b"doc3");
        assert_eq!(h, hash_set([b"doc1".as_slice(), b"doc2", b"doc3"]));
    }

    #[test]
    fn verification_accepts_the_right_delta_only() {
        let old = hash_set([b"doc1".as_slice(), b"doc2"]);
        let new = extend(&old, b"doc3");

        assert!(verify_extension(&old, &new, b"doc3"));
        assert!(!verify_extension(&old, &new, b"doc4"));

        let tampered = hash_element(b"malicious");
        assert!(!verify_extension(&old, &tampered, b"doc3"));
    }

    #[test]
    fn larger_sets_hash_to_nonzero() {
        let elements: Vec<Vec<u8>> = (0u8..100).map(|i| vec![i]).collect();
        assert!(!hash_set(&elements).is_zero());
    }
}
