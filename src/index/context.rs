//! Context index: one independent term index per context.
//!
//! A context is a named field with its own index implementation, chosen by
//! the context's type when the context is created. The concrete
//! implementations differ in key and value representation — [`AnyIndex`]
//! owns one of them per context and routes every operation — but all present
//! the same text-keyed, occurrence-valued surface.
//!
//! The set of contexts here must always equal the schema's keys; the engine
//! applies `insert_context`/`delete_context` to both in one transition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::doc::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::index::compressed::{CompressedIndex, CompressedOccurrences};
use crate::index::keyed::{IntKeyCodec, KeyedIndex, PositionKeyCodec};
use crate::index::posting::Occurrences;
use crate::index::term::{BTreeIndex, IndexValue, SearchMode, TermIndex};

/// The result of one term-index search: matched terms with their postings,
/// in index order. The order is meaningful for limiting.
pub type RawResult = Vec<(String, Occurrences)>;

type TextIndex = CompressedIndex<BTreeIndex<String, CompressedOccurrences>>;
type IntIndex = KeyedIndex<IntKeyCodec, BTreeIndex<String, Occurrences>>;
type DateIndex = BTreeIndex<String, Occurrences>;
type PositionIndex = KeyedIndex<PositionKeyCodec, BTreeIndex<String, Occurrences>>;

/// A context's posting store, tagged by implementation.
///
/// Text postings are stored compressed; int and position keys go through
/// their order-preserving codecs; dates are stored as ISO text, which is
/// already ordered chronologically.
///
/// Externally tagged serialization: the variant tag selects the posting
/// codec when a persisted indexer is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnyIndex {
    Text(TextIndex),
    Int(IntIndex),
    Date(DateIndex),
    Position(PositionIndex),
}

macro_rules! delegate {
    ($self:expr, $ix:ident => $body:expr) => {
        match $self {
            AnyIndex::Text($ix) => $body,
            AnyIndex::Int($ix) => $body,
            AnyIndex::Date($ix) => $body,
            AnyIndex::Position($ix) => $body,
        }
    };
}

impl AnyIndex {
    /// An empty text index.
    pub fn empty_text() -> Self {
        AnyIndex::Text(TextIndex::default())
    }

    /// An empty integer index.
    pub fn empty_int() -> Self {
        AnyIndex::Int(IntIndex::new(IntKeyCodec))
    }

    /// An empty date index.
    pub fn empty_date() -> Self {
        AnyIndex::Date(DateIndex::new())
    }

    /// An empty geographic position index.
    pub fn empty_position() -> Self {
        AnyIndex::Position(PositionIndex::new(PositionKeyCodec))
    }

    /// Insert term postings, merging with existing posting lists.
    pub fn insert_list(&mut self, items: Vec<(String, Occurrences)>) -> Result<()> {
        delegate!(self, ix => ix.insert_list(IndexValue::merge, items))
    }

    /// Remove the given documents from every posting list.
    pub fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()> {
        delegate!(self, ix => ix.delete_docs(docs))
    }

    pub fn search(&self, mode: SearchMode, term: &str) -> Result<RawResult> {
        let term = term.to_string();
        delegate!(self, ix => ix.search(mode, &term))
    }

    pub fn lookup_range(&self, lo: &str, hi: &str) -> Result<RawResult> {
        let (lo, hi) = (lo.to_string(), hi.to_string());
        delegate!(self, ix => ix.lookup_range(&lo, &hi))
    }

    /// Number of distinct terms in this context.
    pub fn term_count(&self) -> usize {
        delegate!(self, ix => ix.term_count())
    }

    pub fn is_empty(&self) -> bool {
        self.term_count() == 0
    }
}

/// A registered context type: validates terms and mints empty indices.
#[derive(Debug, Clone, Copy)]
pub struct ContextType {
    /// The name schemas refer to this type by.
    pub name: &'static str,
    /// Accepts or rejects a normalized term for this type.
    pub validate: fn(&str) -> bool,
    /// Creates an empty index of the right implementation.
    pub new_index: fn() -> AnyIndex,
}

fn validate_text(term: &str) -> bool {
    !term.is_empty()
}

fn validate_int(term: &str) -> bool {
    term.trim().parse::<i64>().is_ok()
}

/// Full ISO date, or a year / year-month prefix so that word queries over
/// date contexts can match coarser granularities.
fn validate_date(term: &str) -> bool {
    let term = term.trim();
    if !term.is_ascii() {
        return false;
    }
    match term.len() {
        4 => term.chars().all(|c| c.is_ascii_digit()),
        7 => {
            let (year, month) = (&term[..4], &term[5..]);
            term.as_bytes()[4] == b'-'
                && year.chars().all(|c| c.is_ascii_digit())
                && matches!(month.parse::<u8>(), Ok(1..=12))
        }
        10 => chrono::NaiveDate::parse_from_str(term, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}

/// `lat,lon` in decimal degrees with at most four decimal places each.
fn validate_position(term: &str) -> bool {
    let Some((lat, lon)) = term.trim().split_once(',') else {
        return false;
    };
    let in_domain = |s: &str, limit: f64| {
        let s = s.trim();
        let decimals = s.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0);
        decimals <= 4
            && s.parse::<f64>()
                .map(|v| (-limit..=limit).contains(&v))
                .unwrap_or(false)
    };
    in_domain(lat, 90.0) && in_domain(lon, 180.0)
}

/// The context types known to an engine instance, looked up by name when a
/// context is created and when a persisted indexer is re-linked on load.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<ContextType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry {
            types: vec![
                ContextType { name: "text", validate: validate_text, new_index: AnyIndex::empty_text },
                ContextType { name: "int", validate: validate_int, new_index: AnyIndex::empty_int },
                ContextType { name: "date", validate: validate_date, new_index: AnyIndex::empty_date },
                ContextType {
                    name: "position",
                    validate: validate_position,
                    new_index: AnyIndex::empty_position,
                },
            ],
        }
    }
}

impl TypeRegistry {
    /// A registry with no types. Useful when the default set is unwanted.
    pub fn empty() -> Self {
        TypeRegistry { types: Vec::new() }
    }

    /// Look a type up by name.
    pub fn get(&self, name: &str) -> Option<&ContextType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Register an additional type. Fails on a duplicate name.
    pub fn register(&mut self, ty: ContextType) -> Result<()> {
        if self.get(ty.name).is_some() {
            return Err(QuarryError::conflict(format!(
                "context type '{}' is already registered",
                ty.name
            )));
        }
        self.types.push(ty);
        Ok(())
    }

    /// Names of all registered types.
    pub fn names(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.name).collect()
    }
}

/// Routes operations across a map of per-context indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextIndex {
    contexts: BTreeMap<String, AnyIndex>,
}

impl ContextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new sub-index under `context`. Fails if it already exists.
    pub fn insert_context(&mut self, context: impl Into<String>, index: AnyIndex) -> Result<()> {
        let context = context.into();
        if self.contexts.contains_key(&context) {
            return Err(QuarryError::conflict(format!("context '{context}' already exists")));
        }
        self.contexts.insert(context, index);
        Ok(())
    }

    /// Remove `context` and all its postings. Returns whether it existed.
    pub fn delete_context(&mut self, context: &str) -> bool {
        self.contexts.remove(context).is_some()
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.contexts.contains_key(context)
    }

    /// Current context names, in order.
    pub fn contexts(&self) -> Vec<&str> {
        self.contexts.keys().map(|s| s.as_str()).collect()
    }

    /// Insert postings into one context.
    pub fn insert_list_cx(
        &mut self,
        context: &str,
        items: Vec<(String, Occurrences)>,
    ) -> Result<()> {
        self.get_mut(context)?.insert_list(items)
    }

    /// Search one context.
    pub fn search_with_cx(&self, mode: SearchMode, context: &str, term: &str) -> Result<RawResult> {
        self.get(context)?.search(mode, term)
    }

    /// Search several contexts, each with its own already-normalized term.
    pub fn search_with_cxs_normalized(
        &self,
        mode: SearchMode,
        terms: &[(String, String)],
    ) -> Result<Vec<(String, RawResult)>> {
        terms
            .iter()
            .map(|(cx, term)| Ok((cx.clone(), self.search_with_cx(mode, cx, term)?)))
            .collect()
    }

    /// Inclusive range lookup in one context.
    pub fn lookup_range_cx(&self, context: &str, lo: &str, hi: &str) -> Result<RawResult> {
        self.get(context)?.lookup_range(lo, hi)
    }

    /// Remove the given documents from every context.
    pub fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()> {
        for index in self.contexts.values_mut() {
            index.delete_docs(docs)?;
        }
        Ok(())
    }

    /// Distinct term count per context, for status reporting.
    pub fn term_counts(&self) -> Vec<(&str, usize)> {
        self.contexts
            .iter()
            .map(|(cx, ix)| (cx.as_str(), ix.term_count()))
            .collect()
    }

    fn get(&self, context: &str) -> Result<&AnyIndex> {
        self.contexts
            .get(context)
            .ok_or_else(|| QuarryError::not_found(format!("context '{context}'")))
    }

    fn get_mut(&mut self, context: &str) -> Result<&mut AnyIndex> {
        self.contexts
            .get_mut(context)
            .ok_or_else(|| QuarryError::not_found(format!("context '{context}'")))
    }
}
