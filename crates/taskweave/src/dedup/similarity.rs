//! Token-overlap similarity between task texts.

use std::collections::{BTreeSet, HashSet};

use crate::config::SimilarityKind;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "do", "does", "for", "from", "get", "had", "has",
    "have", "he", "her", "his", "i", "if", "in", "into", "is", "it", "its", "just", "let", "me",
    "my", "need", "needs", "of", "on", "or", "our", "please", "she", "should", "so", "some",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "up",
    "us", "was", "we", "were", "what", "when", "which", "who", "will", "with", "would", "you",
    "your",
];

/// Lowercased alphanumeric words of `text`, in order.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Turns text into the normalized token set compared by [`Similarity`]:
/// lowercase, split on non-alphanumerics, stop words and 1-char tokens removed.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<String>,
}

impl Tokenizer {
    pub fn new(extra_stop_words: &[String]) -> Self {
        let stop_words = STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stop_words.iter().map(|w| w.to_lowercase()))
            .collect();
        Self { stop_words }
    }

    pub fn tokens(&self, text: &str) -> BTreeSet<String> {
        words(text)
            .filter(|w| w.chars().count() > 1 && !self.stop_words.contains(w))
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&[])
    }
}

pub trait Similarity: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score in `[0, 1]`. Two empty sets score 0.
    fn score(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64;
}

/// |A ∩ B| / |A ∪ B|
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Similarity for Jaccard {
    fn name(&self) -> &'static str {
        "jaccard"
    }

    fn score(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
        let intersection = a.intersection(b).count();
        let union = a.len() + b.len() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

/// |A ∩ B| / min(|A|, |B|). Lets a short restatement match a longer task.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overlap;

impl Similarity for Overlap {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn score(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
        let smaller = a.len().min(b.len());
        if smaller == 0 {
            return 0.0;
        }
        a.intersection(b).count() as f64 / smaller as f64
    }
}

pub fn similarity_for(kind: SimilarityKind) -> Box<dyn Similarity> {
    match kind {
        SimilarityKind::Jaccard => Box::new(Jaccard),
        SimilarityKind::Overlap => Box::new(Overlap),
    }
}
