//! Text analysis.
//!
//! Analyzers turn raw field content into a stream of positioned tokens for
//! indexing, and normalize query terms before they hit the index. Which
//! analyzer a context uses is part of its schema entry.
//!
//! The pipeline is deliberately small: the engine only needs the interface,
//! and anything fancier (stemming, synonyms, char filters) plugs in behind
//! the same trait.

use serde::{Deserialize, Serialize};

/// A token produced by analysis: its position within the content and its text.
pub type Token = (u32, String);

/// Turns content into positioned tokens and normalizes query terms.
pub trait Analyzer: Send + Sync {
    /// Split content into `(position, term)` pairs. Positions are token
    /// ordinals, starting at zero.
    fn tokenize(&self, text: &str) -> Vec<Token>;

    /// Normalize a single query term before lookup. Must be consistent with
    /// what `tokenize` produces for the same input.
    fn normalize(&self, term: &str) -> String;
}

/// Splits on any non-alphanumeric character and keeps the original case.
///
/// Case folding for `NoCase` searches happens at query time inside the index,
/// so the stored terms stay searchable case-sensitively as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAnalyzer;

impl Analyzer for StandardAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, t)| (i as u32, t.to_string()))
            .collect()
    }

    fn normalize(&self, term: &str) -> String {
        term.trim().to_string()
    }
}

/// Emits the whole trimmed value as a single token at position zero.
///
/// Used for contexts whose values are atomic: dates, numbers, identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![(0, trimmed.to_string())]
        }
    }

    fn normalize(&self, term: &str) -> String {
        term.trim().to_string()
    }
}

/// Analyzer selection stored in a context schema.
///
/// The schema is serialized with the rest of the indexer, so analyzers are
/// referenced by kind rather than held as trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// [`StandardAnalyzer`]: split on non-alphanumeric characters.
    #[default]
    Standard,
    /// [`KeywordAnalyzer`]: one token per value.
    Keyword,
}

static STANDARD: StandardAnalyzer = StandardAnalyzer;
static KEYWORD: KeywordAnalyzer = KeywordAnalyzer;

impl AnalyzerKind {
    /// Resolve the kind to its analyzer implementation.
    pub fn analyzer(&self) -> &'static dyn Analyzer {
        match self {
            AnalyzerKind::Standard => &STANDARD,
            AnalyzerKind::Keyword => &KEYWORD,
        }
    }
}
