//! The query language.
//!
//! Queries arrive as an abstract syntax tree; the control plane owns any
//! concrete syntax. [`optimize`] is an optional semantics-preserving rewrite
//! pass applied before evaluation.

pub mod fuzzy;
pub mod intermediate;
pub mod processor;

use serde::{Deserialize, Serialize};

/// How a word or phrase probe treats case and spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCase {
    /// Case-sensitive.
    Case,
    /// Case-insensitive.
    NoCase,
    /// Case-insensitive over the fuzzy variant set of the term.
    Fuzzy,
}

/// Binary set operators over subquery results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    And,
    Or,
    AndNot,
}

/// A search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Match a single word by prefix.
    Word { case: MatchCase, term: String },
    /// Match consecutive words at adjacent positions.
    Phrase { case: MatchCase, phrase: String },
    /// Restrict the subquery to the named contexts.
    Context { contexts: Vec<String>, query: Box<Query> },
    /// Combine two subqueries.
    Binary { op: BinOp, left: Box<Query>, right: Box<Query> },
    /// Inclusive term range within each active context.
    Range { lo: String, hi: String },
    /// Multiply the boost of every matched document.
    Boost { factor: f64, query: Box<Query> },
}

impl Query {
    pub fn word(case: MatchCase, term: impl Into<String>) -> Self {
        Query::Word { case, term: term.into() }
    }

    pub fn phrase(case: MatchCase, phrase: impl Into<String>) -> Self {
        Query::Phrase { case, phrase: phrase.into() }
    }

    pub fn context(contexts: Vec<String>, query: Query) -> Self {
        Query::Context { contexts, query: Box::new(query) }
    }

    pub fn and(left: Query, right: Query) -> Self {
        Query::Binary { op: BinOp::And, left: Box::new(left), right: Box::new(right) }
    }

    pub fn or(left: Query, right: Query) -> Self {
        Query::Binary { op: BinOp::Or, left: Box::new(left), right: Box::new(right) }
    }

    pub fn and_not(left: Query, right: Query) -> Self {
        Query::Binary { op: BinOp::AndNot, left: Box::new(left), right: Box::new(right) }
    }

    pub fn range(lo: impl Into<String>, hi: impl Into<String>) -> Self {
        Query::Range { lo: lo.into(), hi: hi.into() }
    }

    pub fn boost(factor: f64, query: Query) -> Self {
        Query::Boost { factor, query: Box::new(query) }
    }
}

/// Rewrite a query without changing its meaning.
///
/// Folds away identity boosts, merges nested boosts by multiplication, and
/// drops outer context restrictions that an inner restriction overrides
/// (evaluation replaces, not narrows, the active set). Same-operator nests
/// of `And`/`Or` are flattened into a canonical left-deep chain — both
/// combinators are associative, so only the operand order is preserved.
/// Mixed-operator trees and `AndNot` (which is not associative) are left
/// untouched. Applying the pass twice equals applying it once.
pub fn optimize(query: Query) -> Query {
    match query {
        Query::Boost { factor, query } => match optimize(*query) {
            Query::Boost { factor: inner, query } => {
                let combined = factor * inner;
                if combined == 1.0 {
                    *query
                } else {
                    Query::Boost { factor: combined, query }
                }
            }
            inner if factor == 1.0 => inner,
            inner => Query::Boost { factor, query: Box::new(inner) },
        },
        Query::Context { contexts, query } => match optimize(*query) {
            // The inner restriction wins regardless of the outer one.
            inner @ Query::Context { .. } => inner,
            inner => Query::Context { contexts, query: Box::new(inner) },
        },
        Query::Binary { op, left, right } => {
            let left = optimize(*left);
            let right = optimize(*right);
            match op {
                BinOp::And | BinOp::Or => splice(op, left, right),
                BinOp::AndNot => {
                    Query::Binary { op, left: Box::new(left), right: Box::new(right) }
                }
            }
        }
        leaf => leaf,
    }
}

/// Append `right` to the chain ending in `left`, hoisting same-operator
/// nests on the right so the result is a left-deep chain. Both inputs are
/// already optimized, so `left` is in chain form.
fn splice(op: BinOp, left: Query, right: Query) -> Query {
    match right {
        Query::Binary { op: inner, left: mid, right: last } if inner == op => {
            let merged = splice(op, left, *mid);
            splice(op, merged, *last)
        }
        other => Query::Binary { op, left: Box::new(left), right: Box::new(other) },
    }
}
