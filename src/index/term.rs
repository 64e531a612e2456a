//! The generic term index and its in-memory implementation.
//!
//! [`TermIndex`] is the capability every posting store implements: an ordered
//! key-value store over terms with exact, case-insensitive, prefix and range
//! search. The proxies in the sibling modules wrap any `TermIndex` to change
//! its key representation ([`super::keyed`]) or value representation
//! ([`super::compressed`]) without the callers noticing.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::doc::DocIdSet;
use crate::error::Result;
use crate::index::posting::Occurrences;

/// How a term probe matches stored keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Exact, case-sensitive match.
    Case,
    /// Exact match ignoring case.
    NoCase,
    /// Case-sensitive prefix match.
    PrefixCase,
    /// Prefix match ignoring case.
    PrefixNoCase,
}

impl SearchMode {
    /// Whether this mode matches prefixes rather than whole keys.
    pub fn is_prefix(&self) -> bool {
        matches!(self, SearchMode::PrefixCase | SearchMode::PrefixNoCase)
    }

    /// Whether this mode folds case before comparing.
    pub fn folds_case(&self) -> bool {
        matches!(self, SearchMode::NoCase | SearchMode::PrefixNoCase)
    }
}

/// Key capability: ordered, clonable, with the case and prefix semantics
/// [`SearchMode`] needs.
pub trait IndexKey: Ord + Clone {
    /// Case-folded form of the key, used by the `NoCase` modes.
    fn fold_case(&self) -> Self;

    /// Whether `self` starts with `prefix`.
    fn has_prefix(&self, prefix: &Self) -> bool;
}

impl IndexKey for String {
    fn fold_case(&self) -> Self {
        self.to_lowercase()
    }

    fn has_prefix(&self, prefix: &Self) -> bool {
        self.starts_with(prefix.as_str())
    }
}

/// Value capability: what the index needs to combine posting lists and to
/// strip deleted documents out of them.
///
/// Implementations may store the value in a transformed representation (see
/// [`super::compressed`]); both operations are allowed to fail on a corrupt
/// representation, which surfaces as an internal error.
pub trait IndexValue: Clone {
    /// Combine two values for the same term.
    fn merge(self, other: Self) -> Result<Self>
    where
        Self: Sized;

    /// Remove the given documents. `None` means the value became empty and
    /// must be purged from the index.
    fn without_docs(&self, docs: &DocIdSet) -> Result<Option<Self>>
    where
        Self: Sized;
}

impl IndexValue for Occurrences {
    fn merge(self, other: Self) -> Result<Self> {
        Ok(self.union(&other))
    }

    fn without_docs(&self, docs: &DocIdSet) -> Result<Option<Self>> {
        Ok(Occurrences::without_docs(self, docs))
    }
}

/// The term index capability.
///
/// Guarantees: `search` results are deduplicated by key, and empty values are
/// never stored (deletion purges them).
pub trait TermIndex {
    type Key: IndexKey;
    type Value: IndexValue;

    /// Insert entries, combining with any existing value via `op`.
    fn insert_list<F>(&mut self, op: F, items: Vec<(Self::Key, Self::Value)>) -> Result<()>
    where
        F: Fn(Self::Value, Self::Value) -> Result<Self::Value>;

    /// Remove the given documents from every posting list, purging lists
    /// that become empty.
    fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()>;

    /// Find terms matching `key` under `mode`, with their full postings.
    fn search(&self, mode: SearchMode, key: &Self::Key) -> Result<Vec<(Self::Key, Self::Value)>>;

    /// Inclusive lexicographic range lookup. An inverted range (`lo > hi`)
    /// yields no results.
    fn lookup_range(&self, lo: &Self::Key, hi: &Self::Key)
        -> Result<Vec<(Self::Key, Self::Value)>>;

    /// Merge another index of the same shape into this one.
    fn union_with<F>(&mut self, op: F, other: Self) -> Result<()>
    where
        F: Fn(Self::Value, Self::Value) -> Result<Self::Value>,
        Self: Sized;

    /// Transform every stored value in place.
    fn map_values<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(Self::Value) -> Result<Self::Value>,
        Self: Sized;

    /// Transform every stored value, dropping entries mapped to `None`.
    fn filter_map_values<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(Self::Value) -> Result<Option<Self::Value>>,
        Self: Sized;

    /// All keys in order.
    fn keys(&self) -> Vec<Self::Key>;

    /// All entries in key order.
    fn to_list(&self) -> Vec<(Self::Key, Self::Value)>;

    /// Number of distinct terms.
    fn term_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.term_count() == 0
    }
}

/// The in-memory term index: an ordered map from key to posting value.
///
/// Exact and case-sensitive-prefix searches use the tree order; the `NoCase`
/// modes have to scan, which is the accepted cost of not storing a folded
/// copy of every key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BTreeIndex<K: IndexKey, V: IndexValue> {
    map: BTreeMap<K, V>,
}

impl<K: IndexKey, V: IndexValue> Default for BTreeIndex<K, V> {
    fn default() -> Self {
        BTreeIndex { map: BTreeMap::new() }
    }
}

impl<K: IndexKey, V: IndexValue> BTreeIndex<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from entries, combining duplicate keys via `op`.
    pub fn from_list<F>(op: F, items: Vec<(K, V)>) -> Result<Self>
    where
        F: Fn(V, V) -> Result<V>,
    {
        let mut index = Self::new();
        index.insert_list(op, items)?;
        Ok(index)
    }
}

impl<K: IndexKey, V: IndexValue> TermIndex for BTreeIndex<K, V> {
    type Key = K;
    type Value = V;

    fn insert_list<F>(&mut self, op: F, items: Vec<(K, V)>) -> Result<()>
    where
        F: Fn(V, V) -> Result<V>,
    {
        for (key, value) in items {
            match self.map.remove(&key) {
                Some(existing) => {
                    let combined = op(existing, value)?;
                    self.map.insert(key, combined);
                }
                None => {
                    self.map.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()> {
        let mut purge = Vec::new();
        let mut replace = Vec::new();
        for (key, value) in &self.map {
            match value.without_docs(docs)? {
                Some(remaining) => replace.push((key.clone(), remaining)),
                None => purge.push(key.clone()),
            }
        }
        for key in purge {
            self.map.remove(&key);
        }
        for (key, value) in replace {
            self.map.insert(key, value);
        }
        Ok(())
    }

    fn search(&self, mode: SearchMode, key: &K) -> Result<Vec<(K, V)>> {
        let results = match mode {
            SearchMode::Case => self
                .map
                .get(key)
                .map(|v| vec![(key.clone(), v.clone())])
                .unwrap_or_default(),
            SearchMode::NoCase => {
                let folded = key.fold_case();
                self.map
                    .iter()
                    .filter(|(k, _)| k.fold_case() == folded)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }
            SearchMode::PrefixCase => self
                .map
                .range((Bound::Included(key.clone()), Bound::Unbounded))
                .take_while(|(k, _)| k.has_prefix(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            SearchMode::PrefixNoCase => {
                let folded = key.fold_case();
                self.map
                    .iter()
                    .filter(|(k, _)| k.fold_case().has_prefix(&folded))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }
        };
        Ok(results)
    }

    fn lookup_range(&self, lo: &K, hi: &K) -> Result<Vec<(K, V)>> {
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(self
            .map
            .range((Bound::Included(lo.clone()), Bound::Included(hi.clone())))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn union_with<F>(&mut self, op: F, other: Self) -> Result<()>
    where
        F: Fn(V, V) -> Result<V>,
    {
        self.insert_list(op, other.map.into_iter().collect())
    }

    fn map_values<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(V) -> Result<V>,
    {
        let entries = std::mem::take(&mut self.map);
        for (key, value) in entries {
            self.map.insert(key, f(value)?);
        }
        Ok(())
    }

    fn filter_map_values<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(V) -> Result<Option<V>>,
    {
        let entries = std::mem::take(&mut self.map);
        for (key, value) in entries {
            if let Some(kept) = f(value)? {
                self.map.insert(key, kept);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<K> {
        self.map.keys().cloned().collect()
    }

    fn to_list(&self) -> Vec<(K, V)> {
        self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn term_count(&self) -> usize {
        self.map.len()
    }
}
