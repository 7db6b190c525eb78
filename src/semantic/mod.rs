//! Semantic fingerprinting.
//!
//! The semantic half of the dual hash: [`features`] extracts a universal
//! feature record from content bytes, [`kernel`] compares two records
//! under user-supplied weights. There is no corpus state: term weights
//! are plain TF, so two nodes always agree on a document's features.

pub mod features;
pub mod kernel;

pub use features::{Features, NGRAM_SIZE, TOP_KEYWORDS, extract, ngrams, term_frequency, tokenize};
pub use kernel::{
    KernelParams, RankedResult, SimilarityBreakdown, cosine_similarity, explain, filter_relevant,
    is_relevant, jaccard_similarity, rank_by_similarity, similarity, structural_similarity,
};
