//! Intermediate query results and their combinator algebra.
//!
//! An [`Intermediate`] maps each matched document to the contexts and words
//! it was matched through, together with a multiplicative boost. Boolean,
//! phrase, range and boost queries are all evaluated by combining
//! intermediates; only at the very end is the result joined against the
//! document table.
//!
//! Values are transient per query and never persisted.

use ahash::AHashMap;

use crate::doc::DocId;
use crate::index::context::RawResult;
use crate::index::posting::Positions;

/// Multiplicative document weight. Composes by multiplication; `1.0` is the
/// identity.
pub type Boost = f64;

/// Which search terms produced a matched word, and the word's ranking score.
///
/// Scores start at zero; the ranker assigns them after materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct WordInfo {
    pub terms: Vec<String>,
    pub score: f64,
}

impl WordInfo {
    pub fn new(terms: Vec<String>) -> Self {
        WordInfo { terms, score: 0.0 }
    }

    /// Combine: terms deduplicated, scores summed.
    pub fn merge(&mut self, other: &WordInfo) {
        for term in &other.terms {
            if !self.terms.contains(term) {
                self.terms.push(term.clone());
            }
        }
        self.score += other.score;
    }
}

/// A matched word: its info and the positions it matched at.
#[derive(Debug, Clone, PartialEq)]
pub struct WordMatch {
    pub info: WordInfo,
    pub positions: Positions,
}

/// Words matched within one context.
pub type WordMap = AHashMap<String, WordMatch>;

/// Context name to the words matched in it.
pub type ContextMap = AHashMap<String, WordMap>;

/// One document's share of an intermediate result.
#[derive(Debug, Clone, PartialEq)]
pub struct DocMatch {
    pub contexts: ContextMap,
    pub boost: Boost,
}

/// The combinator domain: document id to its matches and boost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intermediate {
    docs: AHashMap<DocId, DocMatch>,
}

/// Recursive combine of two per-document matches: contexts union, words
/// union, infos merged, positions unioned. The boost combine is supplied by
/// the caller, which is the only difference between `union` and `merge`.
fn combine_doc(mut a: DocMatch, b: DocMatch, boost_op: impl Fn(Boost, Boost) -> Boost) -> DocMatch {
    for (context, words) in b.contexts {
        match a.contexts.entry(context) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(words);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let mine = slot.get_mut();
                for (word, theirs) in words {
                    match mine.entry(word) {
                        std::collections::hash_map::Entry::Vacant(ws) => {
                            ws.insert(theirs);
                        }
                        std::collections::hash_map::Entry::Occupied(mut ws) => {
                            let existing = ws.get_mut();
                            existing.info.merge(&theirs.info);
                            existing.positions = existing.positions.union(&theirs.positions);
                        }
                    }
                }
            }
        }
    }
    DocMatch { contexts: a.contexts, boost: boost_op(a.boost, b.boost) }
}

impl Intermediate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Number of matched documents.
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.docs.contains_key(&doc)
    }

    pub fn get(&self, doc: DocId) -> Option<&DocMatch> {
        self.docs.get(&doc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &DocMatch)> + '_ {
        self.docs.iter().map(|(d, m)| (*d, m))
    }

    /// Union: documents from both sides; shared documents combine
    /// recursively and their boosts multiply.
    pub fn union(mut self, other: Intermediate) -> Intermediate {
        for (doc, theirs) in other.docs {
            let entry = match self.docs.remove(&doc) {
                Some(mine) => combine_doc(mine, theirs, |a, b| a * b),
                None => theirs,
            };
            self.docs.insert(doc, entry);
        }
        self
    }

    /// Like [`union`](Self::union), but the right-hand boost is treated as
    /// the identity. Used to combine the per-context results of a single
    /// query term without re-applying the user's boost.
    pub fn merge(mut self, other: Intermediate) -> Intermediate {
        for (doc, theirs) in other.docs {
            let entry = match self.docs.remove(&doc) {
                Some(mine) => combine_doc(mine, theirs, |a, _| a),
                None => theirs,
            };
            self.docs.insert(doc, entry);
        }
        self
    }

    /// Documents present on both sides, combined as in union.
    pub fn intersection(mut self, mut other: Intermediate) -> Intermediate {
        let shared: Vec<DocId> = self
            .docs
            .keys()
            .filter(|d| other.docs.contains_key(d))
            .copied()
            .collect();
        let mut out = AHashMap::with_capacity(shared.len());
        for doc in shared {
            if let (Some(mine), Some(theirs)) = (self.docs.remove(&doc), other.docs.remove(&doc)) {
                out.insert(doc, combine_doc(mine, theirs, |a, b| a * b));
            }
        }
        Intermediate { docs: out }
    }

    /// Documents of the left side not present on the right; values from the
    /// left, unchanged.
    pub fn difference(mut self, other: Intermediate) -> Intermediate {
        self.docs.retain(|doc, _| !other.docs.contains_key(doc));
        self
    }

    /// Left-fold of [`union`](Self::union) starting from empty.
    pub fn unions(items: Vec<Intermediate>) -> Intermediate {
        items.into_iter().fold(Intermediate::new(), Intermediate::union)
    }

    /// Left-fold of [`merge`](Self::merge) starting from empty.
    pub fn merges(items: Vec<Intermediate>) -> Intermediate {
        items.into_iter().fold(Intermediate::new(), Intermediate::merge)
    }

    /// Union the list until the running result holds at least `limit`
    /// documents, then stop. The list is assumed ordered best-first; zero
    /// disables the limit.
    pub fn unions_doc_limited(limit: usize, items: Vec<Intermediate>) -> Intermediate {
        Self::fold_doc_limited(limit, items, Intermediate::union)
    }

    /// [`merges`](Self::merges) with the same early stop.
    pub fn merges_doc_limited(limit: usize, items: Vec<Intermediate>) -> Intermediate {
        Self::fold_doc_limited(limit, items, Intermediate::merge)
    }

    fn fold_doc_limited(
        limit: usize,
        items: Vec<Intermediate>,
        op: impl Fn(Intermediate, Intermediate) -> Intermediate,
    ) -> Intermediate {
        let mut acc = Intermediate::new();
        for item in items {
            acc = op(acc, item);
            if limit > 0 && acc.doc_count() >= limit {
                break;
            }
        }
        acc
    }

    /// Multiply every document's boost by `factor`.
    pub fn boost_all(mut self, factor: Boost) -> Intermediate {
        for entry in self.docs.values_mut() {
            entry.boost *= factor;
        }
        self
    }

    /// Build an intermediate for one term in one context from a raw posting
    /// result. Every document is tagged with the context and boosted by the
    /// context's weight.
    ///
    /// When a document appears under several words of the raw result, the
    /// first word wins. Callers must not pass raw results where several
    /// words match one document and the choice matters; the search paths in
    /// this crate satisfy that by construction.
    pub fn from_raw(context: &str, weight: Boost, terms: Vec<String>, raw: RawResult) -> Self {
        let mut docs: AHashMap<DocId, DocMatch> = AHashMap::new();
        for (word, occurrences) in raw {
            for (doc, positions) in occurrences.iter() {
                docs.entry(doc).or_insert_with(|| {
                    let mut words = WordMap::default();
                    words.insert(
                        word.clone(),
                        WordMatch { info: WordInfo::new(terms.clone()), positions: positions.clone() },
                    );
                    let mut contexts = ContextMap::default();
                    contexts.insert(context.to_string(), words);
                    DocMatch { contexts, boost: weight }
                });
            }
        }
        Intermediate { docs }
    }

    /// [`merges`](Self::merges) over [`from_raw`](Self::from_raw) applied to
    /// each `(context, weight, terms, raw)` tuple.
    pub fn from_raw_contexts(items: Vec<(String, Boost, Vec<String>, RawResult)>) -> Self {
        Self::merges(
            items
                .into_iter()
                .map(|(cx, weight, terms, raw)| Self::from_raw(&cx, weight, terms, raw))
                .collect(),
        )
    }
}

impl IntoIterator for Intermediate {
    type Item = (DocId, DocMatch);
    type IntoIter = std::collections::hash_map::IntoIter<DocId, DocMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::Occurrences;
    use proptest::prelude::*;

    fn leaf(doc: DocId, context: &str, word: &str, positions: &[u32], boost: f64) -> Intermediate {
        let raw = vec![(
            word.to_string(),
            Occurrences::single(doc, Positions::from_vec(positions.to_vec())),
        )];
        Intermediate::from_raw(context, boost, vec![word.to_string()], raw)
    }

    #[test]
    fn test_union_combines_shared_docs() {
        let a = leaf(1, "content", "hello", &[0], 2.0);
        let b = leaf(1, "content", "hello", &[3], 3.0);
        let u = a.union(b);
        assert_eq!(u.doc_count(), 1);
        let m = u.get(1).unwrap();
        assert_eq!(m.boost, 6.0);
        let word = &m.contexts["content"]["hello"];
        assert_eq!(word.positions.iter().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_merge_keeps_left_boost() {
        let a = leaf(1, "subject", "x", &[0], 2.0);
        let b = leaf(1, "content", "x", &[1], 5.0);
        let m = a.merge(b);
        assert_eq!(m.get(1).unwrap().boost, 2.0);
        assert_eq!(m.get(1).unwrap().contexts.len(), 2);
    }

    #[test]
    fn test_intersection_requires_both_sides() {
        let a = leaf(1, "c", "x", &[0], 1.0).union(leaf(2, "c", "x", &[0], 1.0));
        let b = leaf(2, "c", "y", &[5], 1.0).union(leaf(3, "c", "y", &[0], 1.0));
        let i = a.intersection(b);
        assert_eq!(i.doc_count(), 1);
        assert!(i.contains(2));
        assert_eq!(i.get(2).unwrap().contexts["c"].len(), 2);
    }

    #[test]
    fn test_difference_keeps_left_values() {
        let a = leaf(1, "c", "x", &[0], 7.0).union(leaf(2, "c", "x", &[0], 1.0));
        let b = leaf(2, "c", "y", &[0], 1.0);
        let d = a.difference(b);
        assert_eq!(d.doc_count(), 1);
        assert_eq!(d.get(1).unwrap().boost, 7.0);
    }

    #[test]
    fn test_doc_limited_stops_at_prefix() {
        let items = vec![
            leaf(1, "c", "a", &[0], 1.0),
            leaf(2, "c", "b", &[0], 1.0),
            leaf(3, "c", "c", &[0], 1.0),
        ];
        let limited = Intermediate::merges_doc_limited(2, items.clone());
        assert_eq!(limited.doc_count(), 2);
        assert!(limited.contains(1) && limited.contains(2));

        // Zero disables the limit.
        assert_eq!(Intermediate::merges_doc_limited(0, items).doc_count(), 3);
    }

    #[test]
    fn test_from_raw_first_word_wins() {
        let raw = vec![
            ("short".to_string(), Occurrences::single(1, Positions::single(0))),
            ("shorter".to_string(), Occurrences::single(1, Positions::single(9))),
        ];
        let i = Intermediate::from_raw("c", 1.0, vec!["sho".to_string()], raw);
        let words = &i.get(1).unwrap().contexts["c"];
        assert!(words.contains_key("short"));
        assert!(!words.contains_key("shorter"));
    }

    fn arb_intermediate() -> impl Strategy<Value = Intermediate> {
        prop::collection::vec(
            (1u64..6, 0usize..2, 0usize..3, prop::collection::vec(0u32..8, 1..4)),
            0..8,
        )
        .prop_map(|entries| {
            let contexts = ["alpha", "beta"];
            let words = ["x", "y", "z"];
            Intermediate::merges(
                entries
                    .into_iter()
                    .map(|(doc, cx, w, ps)| {
                        leaf(doc, contexts[cx], words[w], &ps, 1.0)
                    })
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn union_commutative(a in arb_intermediate(), b in arb_intermediate()) {
            prop_assert_eq!(a.clone().union(b.clone()), b.union(a));
        }

        #[test]
        fn union_associative(
            a in arb_intermediate(),
            b in arb_intermediate(),
            c in arb_intermediate(),
        ) {
            prop_assert_eq!(
                a.clone().union(b.clone()).union(c.clone()),
                a.union(b.union(c))
            );
        }

        #[test]
        fn union_empty_identity(a in arb_intermediate()) {
            prop_assert_eq!(a.clone().union(Intermediate::new()), a.clone());
            prop_assert_eq!(Intermediate::new().union(a.clone()), a);
        }

        #[test]
        fn intersection_laws(a in arb_intermediate(), b in arb_intermediate()) {
            prop_assert_eq!(
                a.clone().intersection(b.clone()),
                b.clone().intersection(a.clone())
            );
            prop_assert_eq!(a.clone().intersection(a.clone()), a.clone());
            prop_assert!(a.intersection(Intermediate::new()).is_empty());
        }

        #[test]
        fn difference_laws(a in arb_intermediate(), b in arb_intermediate()) {
            prop_assert!(a.clone().difference(a.clone()).is_empty());
            prop_assert_eq!(a.clone().difference(Intermediate::new()), a.clone());
            let d = a.clone().difference(b);
            for (doc, _) in d.iter() {
                prop_assert!(a.contains(doc));
            }
        }

        #[test]
        fn doc_limit_reaches_min(n in 1usize..5, items in prop::collection::vec(arb_intermediate(), 0..5)) {
            let nonempty: Vec<Intermediate> =
                items.into_iter().filter(|i| !i.is_empty()).collect();
            let full = Intermediate::unions(nonempty.clone()).doc_count();
            let limited = Intermediate::unions_doc_limited(n, nonempty).doc_count();
            prop_assert!(limited >= n.min(full));
        }
    }
}
