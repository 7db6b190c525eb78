//! Feature extraction.
//!
//! Content bytes are summarised into a [`Features`] record: a normalised
//! term-frequency map, a set of character trigrams, and document counts.
//! Features are model-independent and cheap to recompute, so they are
//! derived on demand from bytes and never mutated in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Character n-gram width used by [`extract`].
pub const NGRAM_SIZE: usize = 3;

/// Maximum number of keywords kept in [`Features::top_keywords`].
pub const TOP_KEYWORDS: usize = 10;

/// Extracted features of one piece of content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Term frequency per lowercase token, normalised by total token count.
    pub tf: BTreeMap<String, f64>,

    /// Character trigrams of the lowercased text. Text shorter than the
    /// n-gram width contributes itself as the single entry, so empty input
    /// yields `{""}`.
    pub ngrams: BTreeSet<String>,

    /// Total token count.
    pub word_count: usize,

    /// Number of distinct tokens.
    pub unique_words: usize,

    /// Number of characters in the text.
    pub char_count: usize,

    /// Highest-frequency tokens, descending, ties in first-occurrence
    /// order. At most [`TOP_KEYWORDS`] entries.
    pub top_keywords: Vec<String>,
}

/// Splits text into lowercase tokens.
///
/// A token is a maximal run of Unicode letters and numbers; everything
/// else separates tokens and is discarded.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut words = Vec::new();
    let mut current = String::new();

    for ch in lowered.chars() {
        if ch.is_alphabetic() || ch.is_numeric() {
            current.push(ch);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Generates the set of character `n`-grams of the lowercased text.
///
/// Text shorter than `n` characters (including the empty string) yields a
/// single-entry set containing the whole lowercased text.
pub fn ngrams(text: &str, n: usize) -> BTreeSet<String> {
    let n = if n == 0 { NGRAM_SIZE } else { n };
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();

    let mut set = BTreeSet::new();
    if chars.len() < n {
        set.insert(lowered);
        return set;
    }
    for window in chars.windows(n) {
        set.insert(window.iter().collect());
    }
    set
}

/// Computes normalised term frequencies: `count(token) / total_tokens`.
pub fn term_frequency(words: &[String]) -> BTreeMap<String, f64> {
    let mut tf = BTreeMap::new();
    if words.is_empty() {
        return tf;
    }

    let total = words.len() as f64;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in words {
        *counts.entry(word).or_default() += 1;
    }
    for (word, count) in counts {
        tf.insert(word.to_string(), count as f64 / total);
    }

    tf
}

/// Extracts a [`Features`] record from raw content bytes.
///
/// Bytes are decoded as UTF-8 with lossy replacement; features describe
/// the decoded text.
pub fn extract(data: &[u8]) -> Features {
    let text = String::from_utf8_lossy(data);
    let words = tokenize(&text);
    let tf = term_frequency(&words);

    Features {
        top_keywords: top_keywords(&words, &tf),
        ngrams: ngrams(&text, NGRAM_SIZE),
        word_count: words.len(),
        unique_words: tf.len(),
        char_count: text.chars().count(),
        tf,
    }
}

/// Selects the highest-TF tokens, breaking frequency ties by first
/// occurrence in the token stream.
fn top_keywords(words: &[String], tf: &BTreeMap<String, f64>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut ordered: Vec<&String> = Vec::new();
    for word in words {
        if seen.insert(word) {
            ordered.push(word);
        }
    }

    // A stable sort on first-occurrence order realises the tie-break.
    ordered.sort_by(|a, b| {
        let fa = tf.get(*a).copied().unwrap_or(0.0);
        let fb = tf.get(*b).copied().unwrap_or(0.0);
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    ordered.into_iter().take(TOP_KEYWORDS).cloned().collect()
}
