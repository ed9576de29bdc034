//! Merge-or-insert decisions for extracted drafts.
//!
//! The task store supplies candidates; this module decides. Decisions are
//! pure functions of the draft, the candidates and the configured threshold.

pub mod resolver;
pub mod similarity;

pub use resolver::{Deduplicator, Resolution};
pub use similarity::{similarity_for, words, Jaccard, Overlap, Similarity, Tokenizer};
