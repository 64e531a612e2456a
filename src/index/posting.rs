//! Posting primitives.
//!
//! [`Positions`] is the ordered, deduplicated set of token positions at which
//! a term occurs within one document. [`Occurrences`] maps document ids to
//! their positions for one term in one context. Both carry the set algebra
//! the intermediate-result combinators are built on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::doc::{DocId, DocIdSet};

/// A sorted, deduplicated set of token positions within a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positions(Vec<u32>);

impl Positions {
    /// The empty position set.
    pub fn new() -> Self {
        Positions(Vec::new())
    }

    /// Build from arbitrary positions; sorts and deduplicates.
    pub fn from_vec(mut positions: Vec<u32>) -> Self {
        positions.sort_unstable();
        positions.dedup();
        Positions(positions)
    }

    /// A set holding a single position.
    pub fn single(pos: u32) -> Self {
        Positions(vec![pos])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Membership test, binary search over the sorted backing vector.
    pub fn contains(&self, pos: u32) -> bool {
        self.0.binary_search(&pos).is_ok()
    }

    /// Insert a position, keeping the set sorted and deduplicated.
    pub fn insert(&mut self, pos: u32) {
        if let Err(idx) = self.0.binary_search(&pos) {
            self.0.insert(idx, pos);
        }
    }

    /// Iterate positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// Set union by linear merge.
    pub fn union(&self, other: &Positions) -> Positions {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.0[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(other.0[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.0[i..]);
        out.extend_from_slice(&other.0[j..]);
        Positions(out)
    }

    /// Set intersection by linear merge.
    pub fn intersection(&self, other: &Positions) -> Positions {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        Positions(out)
    }

    /// Positions in `self` that are not in `other`.
    pub fn difference(&self, other: &Positions) -> Positions {
        Positions(self.0.iter().copied().filter(|p| !other.contains(*p)).collect())
    }

    /// Keep only positions satisfying the predicate.
    pub fn filter<F: FnMut(u32) -> bool>(&self, mut pred: F) -> Positions {
        Positions(self.0.iter().copied().filter(|p| pred(*p)).collect())
    }
}

impl FromIterator<u32> for Positions {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Positions::from_vec(iter.into_iter().collect())
    }
}

/// For one term in one context: document id to the positions it occurs at.
///
/// Invariant: no entry maps to an empty position set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrences(BTreeMap<DocId, Positions>);

impl Occurrences {
    pub fn new() -> Self {
        Occurrences(BTreeMap::new())
    }

    /// A posting list with one document.
    pub fn single(doc: DocId, positions: Positions) -> Self {
        let mut map = BTreeMap::new();
        if !positions.is_empty() {
            map.insert(doc, positions);
        }
        Occurrences(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of documents in the posting list.
    pub fn doc_count(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, doc: DocId) -> Option<&Positions> {
        self.0.get(&doc)
    }

    pub fn contains_doc(&self, doc: DocId) -> bool {
        self.0.contains_key(&doc)
    }

    /// Record one occurrence of the term in `doc` at `pos`.
    pub fn add(&mut self, doc: DocId, pos: u32) {
        self.0.entry(doc).or_default().insert(pos);
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &Positions)> + '_ {
        self.0.iter().map(|(d, p)| (*d, p))
    }

    /// Union per document; position sets of shared documents are unioned.
    pub fn union(&self, other: &Occurrences) -> Occurrences {
        let mut out = self.0.clone();
        for (doc, positions) in &other.0 {
            out.entry(*doc)
                .and_modify(|existing| *existing = existing.union(positions))
                .or_insert_with(|| positions.clone());
        }
        Occurrences(out)
    }

    /// Documents present on both sides; position sets intersected. Documents
    /// whose intersection is empty are dropped.
    pub fn intersection(&self, other: &Occurrences) -> Occurrences {
        let mut out = BTreeMap::new();
        for (doc, positions) in &self.0 {
            if let Some(theirs) = other.0.get(doc) {
                let shared = positions.intersection(theirs);
                if !shared.is_empty() {
                    out.insert(*doc, shared);
                }
            }
        }
        Occurrences(out)
    }

    /// Documents of `self` minus the documents of `other`.
    pub fn difference(&self, other: &Occurrences) -> Occurrences {
        Occurrences(
            self.0
                .iter()
                .filter(|(doc, _)| !other.0.contains_key(*doc))
                .map(|(d, p)| (*d, p.clone()))
                .collect(),
        )
    }

    /// Remove every document in `docs`. Returns `None` if the posting list
    /// is emptied, so callers can purge it.
    pub fn without_docs(&self, docs: &DocIdSet) -> Option<Occurrences> {
        let remaining: BTreeMap<DocId, Positions> = self
            .0
            .iter()
            .filter(|(doc, _)| !docs.contains(doc))
            .map(|(d, p)| (*d, p.clone()))
            .collect();
        if remaining.is_empty() {
            None
        } else {
            Some(Occurrences(remaining))
        }
    }

    /// Total number of positions across all documents.
    pub fn position_count(&self) -> usize {
        self.0.values().map(Positions::len).sum()
    }
}

impl FromIterator<(DocId, Positions)> for Occurrences {
    fn from_iter<I: IntoIterator<Item = (DocId, Positions)>>(iter: I) -> Self {
        Occurrences(
            iter.into_iter()
                .filter(|(_, p)| !p.is_empty())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_positions_sorted_dedup() {
        let p = Positions::from_vec(vec![5, 1, 3, 1, 5]);
        assert_eq!(p.iter().collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn test_positions_ops() {
        let a = Positions::from_vec(vec![0, 2, 4]);
        let b = Positions::from_vec(vec![2, 3]);
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![0, 2, 3, 4]);
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn test_occurrences_union_merges_positions() {
        let a = Occurrences::single(1, Positions::from_vec(vec![0]));
        let b = Occurrences::single(1, Positions::from_vec(vec![3]));
        let u = a.union(&b);
        assert_eq!(u.doc_count(), 1);
        assert_eq!(u.get(1).unwrap().iter().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_occurrences_without_docs_purges_empty() {
        let mut occ = Occurrences::new();
        occ.add(1, 0);
        occ.add(2, 5);

        let mut gone = DocIdSet::new();
        gone.insert(1);
        let rest = occ.without_docs(&gone).unwrap();
        assert_eq!(rest.doc_count(), 1);
        assert!(rest.contains_doc(2));

        gone.insert(2);
        assert!(occ.without_docs(&gone).is_none());
    }

    fn arb_positions() -> impl Strategy<Value = Positions> {
        prop::collection::vec(0u32..64, 0..16).prop_map(Positions::from_vec)
    }

    proptest! {
        #[test]
        fn position_union_commutative(a in arb_positions(), b in arb_positions()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn position_union_associative(
            a in arb_positions(),
            b in arb_positions(),
            c in arb_positions(),
        ) {
            prop_assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        }

        #[test]
        fn position_union_idempotent(a in arb_positions()) {
            prop_assert_eq!(a.union(&a), a);
        }

        #[test]
        fn position_union_membership(a in arb_positions(), b in arb_positions(), p in 0u32..64) {
            prop_assert_eq!(a.union(&b).contains(p), a.contains(p) || b.contains(p));
        }
    }
}
