//! Parameterised similarity kernel.
//!
//! Similarity is not fixed by the system; each query carries a
//! [`KernelParams`] record weighting three component measures:
//!
//! - semantic: cosine similarity of term-frequency vectors,
//! - lexical: Jaccard similarity of character n-gram sets,
//! - structural: agreement of document counts.
//!
//! Weights are normalised on use, so only their ratios matter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::features::Features;

/// User-configurable similarity weights and admission threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    /// Weight of TF-cosine similarity.
    pub weight_semantic: f64,
    /// Weight of n-gram Jaccard similarity.
    pub weight_lexical: f64,
    /// Weight of structural (count-based) similarity.
    pub weight_structural: f64,
    /// Minimum similarity for a match, in [0, 1].
    pub threshold: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            weight_semantic: 0.6,
            weight_lexical: 0.3,
            weight_structural: 0.1,
            threshold: 0.5,
        }
    }
}

impl KernelParams {
    /// Parameters tuned for meaning-driven search.
    pub fn semantic_focused() -> Self {
        Self {
            weight_semantic: 0.8,
            weight_lexical: 0.15,
            weight_structural: 0.05,
            threshold: 0.6,
        }
    }

    /// Parameters tuned for near-exact text matching.
    pub fn lexical_focused() -> Self {
        Self {
            weight_semantic: 0.2,
            weight_lexical: 0.7,
            weight_structural: 0.1,
            threshold: 0.5,
        }
    }

    /// Validates the parameter record.
    ///
    /// Rejects negative or non-finite weights, an all-zero weight vector,
    /// and a threshold outside [0, 1].
    pub fn validate(&self) -> Result<(), Error> {
        for (name, w) in [
            ("weight_semantic", self.weight_semantic),
            ("weight_lexical", self.weight_lexical),
            ("weight_structural", self.weight_structural),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidParameters(format!(
                    "{name} must be a non-negative finite number, got {w}"
                )));
            }
        }
        if self.weight_semantic + self.weight_lexical + self.weight_structural == 0.0 {
            return Err(Error::InvalidParameters(
                "at least one weight must be positive".to_string(),
            ));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidParameters(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Returns a copy whose weights sum to 1. An all-zero weight vector
    /// falls back to the defaults.
    pub fn normalized(&self) -> KernelParams {
        let total = self.weight_semantic + self.weight_lexical + self.weight_structural;
        if total == 0.0 {
            return KernelParams {
                threshold: self.threshold,
                ..KernelParams::default()
            };
        }
        KernelParams {
            weight_semantic: self.weight_semantic / total,
            weight_lexical: self.weight_lexical / total,
            weight_structural: self.weight_structural / total,
            threshold: self.threshold,
        }
    }
}

/// Cosine similarity of two sparse TF vectors over the union of their
/// keys. Returns 0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;

    for (key, &va) in a {
        mag_a += va * va;
        if let Some(&vb) = b.get(key) {
            dot += va * vb;
        }
    }
    for &vb in b.values() {
        mag_b += vb * vb;
    }

    let mag_a = mag_a.sqrt();
    let mag_b = mag_b.sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Jaccard similarity of two sets. Two empty sets are fully similar.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Structural similarity: agreement of word and unique-word counts.
///
/// For each count pair with a positive maximum, the component similarity
/// is `1 - |a - b| / max(a, b)`; the result is the mean of the present
/// components. Two structurally empty documents are fully similar.
pub fn structural_similarity(a: &Features, b: &Features) -> f64 {
    let pairs = [
        (a.word_count as f64, b.word_count as f64),
        (a.unique_words as f64, b.unique_words as f64),
    ];

    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in pairs {
        let max = x.max(y);
        if max > 0.0 {
            sum += 1.0 - (x - y).abs() / max;
            present += 1;
        }
    }

    if present == 0 { 1.0 } else { sum / present as f64 }
}

/// Computes the weighted similarity of two feature records, in [0, 1].
pub fn similarity(a: &Features, b: &Features, params: KernelParams) -> f64 {
    let params = params.normalized();

    let score = params.weight_semantic * cosine_similarity(&a.tf, &b.tf)
        + params.weight_lexical * jaccard_similarity(&a.ngrams, &b.ngrams)
        + params.weight_structural * structural_similarity(a, b);

    score.clamp(0.0, 1.0)
}

/// Threshold test: `similarity(a, b) >= params.threshold`.
pub fn is_relevant(a: &Features, b: &Features, params: KernelParams) -> bool {
    similarity(a, b, params) >= params.threshold
}

/// One entry of a similarity ranking: the candidate's position in the
/// input slice and its score against the query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankedResult {
    pub index: usize,
    pub similarity: f64,
}

/// Ranks candidates by similarity to the query, descending. The sort is
/// stable, so equal scores keep their input order.
pub fn rank_by_similarity(
    query: &Features,
    candidates: &[Features],
    params: KernelParams,
) -> Vec<RankedResult> {
    let mut results: Vec<RankedResult> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| RankedResult {
            index,
            similarity: similarity(query, candidate, params),
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

/// Returns the indices of candidates meeting the threshold, in input order.
pub fn filter_relevant(
    query: &Features,
    candidates: &[Features],
    params: KernelParams,
) -> Vec<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| is_relevant(query, candidate, params))
        .map(|(index, _)| index)
        .collect()
}

/// Per-component breakdown of one similarity computation.
#[derive(Clone, Copy, Debug)]
pub struct SimilarityBreakdown {
    pub total: f64,
    pub semantic: f64,
    pub lexical: f64,
    pub structural: f64,
    pub params: KernelParams,
}

/// Computes similarity and returns the component scores alongside the
/// normalised weights that combined them.
pub fn explain(a: &Features, b: &Features, params: KernelParams) -> SimilarityBreakdown {
    let params = params.normalized();

    let semantic = cosine_similarity(&a.tf, &b.tf);
    let lexical = jaccard_similarity(&a.ngrams, &b.ngrams);
    let structural = structural_similarity(a, b);

    let total = params.weight_semantic * semantic
        + params.weight_lexical * lexical
        + params.weight_structural * structural;

    SimilarityBreakdown {
        total: total.clamp(0.0, 1.0),
        semantic,
        lexical,
        structural,
        params,
    }
}

impl fmt::Display for SimilarityBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {:.3} | semantic: {:.3} (x{:.2}) | lexical: {:.3} (x{:.2}) | structural: {:.3} (x{:.2})",
            self.total,
            self.semantic,
            self.params.weight_semantic,
            self.lexical,
            self.params.weight_lexical,
            self.structural,
            self.params.weight_structural,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::features::extract;

    const EPSILON: f64 = 1e-9;

    fn tf(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn set(entries: &[&str]) -> BTreeSet<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let a = tf(&[("a", 1.0), ("b", 1.0)]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = tf(&[("a", 1.0)]);
        let b = tf(&[("b", 1.0)]);
        assert!(cosine_similarity(&a, &b).abs() < EPSILON);
    }

    #[test]
    fn cosine_with_a_zero_vector_is_zero() {
        let a = tf(&[("a", 1.0)]);
        let empty = BTreeMap::new();
        assert_eq!(cosine_similarity(&a, &empty), 0.0);
    }

    #[test]
    fn jaccard_covers_identity_disjoint_and_overlap() {
        let ab = set(&["a", "b"]);
        assert!((jaccard_similarity(&ab, &ab) - 1.0).abs() < EPSILON);

        let c = set(&["c"]);
        let d = set(&["d"]);
        assert!(jaccard_similarity(&c, &d).abs() < EPSILON);

        let bc = set(&["b", "c"]);
        assert!((jaccard_similarity(&ab, &bc) - 1.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn jaccard_of_two_empty_sets_is_one() {
        let empty = BTreeSet::new();
        assert_eq!(jaccard_similarity(&empty, &empty), 1.0);
    }

    #[test]
    fn structural_similarity_of_empty_documents_is_one() {
        let a = Features::default();
        assert_eq!(structural_similarity(&a, &a), 1.0);
    }

    #[test]
    fn similarity_is_bounded_and_reflexive() {
        let a = extract(b"the quick brown fox");
        let b = extract(b"a completely different sentence entirely");

        let params = KernelParams::default();
        let sim = similarity(&a, &b, params);
        assert!((0.0..=1.0).contains(&sim));

        assert!((similarity(&a, &a, params) - 1.0).abs() < EPSILON);
        assert!((similarity(&a, &a, KernelParams::lexical_focused()) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        let negative = KernelParams {
            weight_semantic: -0.1,
            ..KernelParams::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(Error::InvalidParameters(_))
        ));

        let all_zero = KernelParams {
            weight_semantic: 0.0,
            weight_lexical: 0.0,
            weight_structural: 0.0,
            threshold: 0.5,
        };
        assert!(all_zero.validate().is_err());

        let out_of_range = KernelParams {
            threshold: 1.5,
            ..KernelParams::default()
        };
        assert!(out_of_range.validate().is_err());

        let nan = KernelParams {
            weight_lexical: f64::NAN,
            ..KernelParams::default()
        };
        assert!(nan.validate().is_err());

        assert!(KernelParams::default().validate().is_ok());
        assert!(KernelParams::semantic_focused().validate().is_ok());
        assert!(KernelParams::lexical_focused().validate().is_ok());
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let params = KernelParams {
            weight_semantic: 2.0,
            weight_lexical: 1.0,
            weight_structural: 1.0,
            threshold: 0.4,
        }
        .normalized();

        let total = params.weight_semantic + params.weight_lexical + params.weight_structural;
        assert!((total - 1.0).abs() < EPSILON);
        assert!((params.weight_semantic - 0.5).abs() < EPSILON);
        assert_eq!(params.threshold, 0.4);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let query = extract(b"machine learning");
        let candidates = vec![
            extract(b"gardening tips for spring"),
            extract(b"machine learning basics"),
            extract(b"deep machine learning models"),
        ];

        let ranked = rank_by_similarity(&query, &candidates, KernelParams::default());
        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        // Identical candidates tie and keep their input order.
        let twins = vec![query.clone(), query.clone()];
        let ranked = rank_by_similarity(&query, &twins, KernelParams::default());
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 1);
    }

    #[test]
    fn filter_returns_indices_above_threshold() {
        let query = extract(b"machine learning");
        let candidates = vec![
            extract(b"machine learning basics"),
            extract(b"cooking recipes"),
        ];
        let params = KernelParams {
            threshold: 0.3,
            ..KernelParams::default()
        };

        let relevant = filter_relevant(&query, &candidates, params);
        assert_eq!(relevant, vec![0]);
    }

    #[test]
    fn explain_matches_similarity() {
        let a = extract(b"alpha beta gamma");
        let b = extract(b"alpha beta delta");
        let params = KernelParams::default();

        let breakdown = explain(&a, &b, params);
        assert!((breakdown.total - similarity(&a, &b, params)).abs() < EPSILON);
        assert!(breakdown.to_string().contains("semantic"));
    }
}
