//! Result materialization and ranking.
//!
//! The final [`Intermediate`] of a query is joined against the document
//! table to produce document hits, and inverted to produce word hits for
//! completions. Scores are zero at materialization time; [`rank_docs`] and
//! [`rank_completions`] assign them afterwards.
//!
//! The default scoring is the plain occurrence-count heuristic: a document
//! scores its boost times the number of matched positions, a word scores its
//! total occurrence count. Both live here and nowhere else, so a different
//! ranker is a drop-in replacement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::doc::{DocId, Document};
use crate::error::Result;
use crate::index::posting::Positions;
use crate::query::intermediate::Intermediate;
use crate::table::DocTable;

/// A matched document with its payload, boost and (initially zero) score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub document: Document,
    pub boost: f64,
    pub score: f64,
}

/// Context → word → matched positions for one document.
pub type ContextHits = BTreeMap<String, BTreeMap<String, Positions>>;

/// One materialized document hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocHit {
    pub info: DocInfo,
    pub contexts: ContextHits,
}

/// All document hits of a query, keyed by document id.
pub type DocHits = BTreeMap<DocId, DocHit>;

/// The search terms behind a matched word, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedWord {
    pub terms: Vec<String>,
    pub score: f64,
}

/// One entry of the inverted view: a word, where it matched, and for which
/// documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordHit {
    pub info: MatchedWord,
    pub contexts: BTreeMap<String, BTreeMap<DocId, Positions>>,
}

/// All word hits of a query, keyed by word.
pub type WordHits = BTreeMap<String, WordHit>;

/// A word completion, ready for the completion command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub word: String,
    pub score: f64,
}

/// Join an intermediate result with the document table.
///
/// A document id without a table entry yields an empty document rather than
/// failing the query; the id was live when the snapshot was taken.
pub fn doc_hits(intermediate: &Intermediate, table: &DocTable) -> Result<DocHits> {
    let mut hits = DocHits::new();
    for (doc_id, doc_match) in intermediate.iter() {
        let document = table.lookup(doc_id)?.unwrap_or_default();
        let mut contexts = ContextHits::new();
        for (context, words) in &doc_match.contexts {
            let inner: BTreeMap<String, Positions> = words
                .iter()
                .map(|(word, matched)| (word.clone(), matched.positions.clone()))
                .collect();
            contexts.insert(context.clone(), inner);
        }
        hits.insert(
            doc_id,
            DocHit {
                info: DocInfo { document, boost: doc_match.boost, score: 0.0 },
                contexts,
            },
        );
    }
    Ok(hits)
}

/// Invert an intermediate result to word hits.
///
/// Empty-term entries are excluded. A word appearing in several documents
/// combines its infos (terms union, scores summed) and its context maps
/// (position union per document).
pub fn word_hits(intermediate: &Intermediate) -> WordHits {
    let mut hits = WordHits::new();
    for (doc_id, doc_match) in intermediate.iter() {
        for (context, words) in &doc_match.contexts {
            for (word, matched) in words {
                if matched.info.terms.iter().all(|t| t.is_empty()) {
                    continue;
                }
                let entry = hits.entry(word.clone()).or_insert_with(|| WordHit {
                    info: MatchedWord { terms: Vec::new(), score: 0.0 },
                    contexts: BTreeMap::new(),
                });
                for term in &matched.info.terms {
                    if !entry.info.terms.contains(term) {
                        entry.info.terms.push(term.clone());
                    }
                }
                entry.info.score += matched.info.score;
                let per_doc = entry.contexts.entry(context.clone()).or_default();
                per_doc
                    .entry(doc_id)
                    .and_modify(|existing| *existing = existing.union(&matched.positions))
                    .or_insert_with(|| matched.positions.clone());
            }
        }
    }
    hits
}

/// Score and order document hits, best first.
///
/// Score: boost × matched position count. Ties break on ascending document
/// id so paging is stable.
pub fn rank_docs(hits: DocHits) -> Vec<(DocId, DocHit)> {
    let mut ranked: Vec<(DocId, DocHit)> = hits
        .into_iter()
        .map(|(doc_id, mut hit)| {
            let occurrences: usize = hit
                .contexts
                .values()
                .flat_map(|words| words.values())
                .map(Positions::len)
                .sum();
            hit.info.score = hit.info.boost * occurrences as f64;
            (doc_id, hit)
        })
        .collect();
    ranked.sort_by(|(a_id, a), (b_id, b)| {
        b.info
            .score
            .partial_cmp(&a.info.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a_id.cmp(b_id))
    });
    ranked
}

/// Score and order word completions by descending occurrence count.
pub fn rank_completions(hits: WordHits) -> Vec<Completion> {
    let mut completions: Vec<Completion> = hits
        .into_iter()
        .map(|(word, hit)| {
            let occurrences: usize = hit
                .contexts
                .values()
                .flat_map(|docs| docs.values())
                .map(Positions::len)
                .sum();
            Completion { word, score: hit.info.score + occurrences as f64 }
        })
        .collect();
    completions.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.word.cmp(&b.word))
    });
    completions
}
