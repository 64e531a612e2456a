//! Value-compression proxy.
//!
//! Posting lists for high-cardinality text contexts dominate the memory
//! footprint, so the text index stores each list zstd-compressed and only
//! inflates it when an operation needs the actual occurrences. The trade is
//! explicit: CPU on every combine, RAM for every stored term.
//!
//! [`CompressedOccurrences`] is the stored representation; it implements the
//! value capability by decompressing, combining, and recompressing, which
//! keeps every combine equivalent to combining the uncompressed values.
//! [`CompressedIndex`] wraps an index of compressed values and presents
//! plain [`Occurrences`] to callers.

use serde::{Deserialize, Serialize};

use crate::doc::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::index::posting::Occurrences;
use crate::index::term::{IndexKey, IndexValue, SearchMode, TermIndex};

/// zstd compression level for posting lists; the low end of the scale is
/// where the speed/ratio balance sits for small binary payloads.
const LEVEL: i32 = 3;

/// A posting list stored as zstd-compressed bincode.
///
/// Contract: `unwrap(wrap(o)) == o` for every occurrence map `o`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedOccurrences(Vec<u8>);

impl CompressedOccurrences {
    /// Compress an occurrence map.
    pub fn wrap(occurrences: &Occurrences) -> Result<Self> {
        let plain = bincode::serialize(occurrences)
            .map_err(|e| QuarryError::internal(format!("posting encode failed: {e}")))?;
        let packed = zstd::encode_all(plain.as_slice(), LEVEL)?;
        Ok(CompressedOccurrences(packed))
    }

    /// Decompress back to the occurrence map.
    pub fn unwrap(&self) -> Result<Occurrences> {
        let plain = zstd::decode_all(self.0.as_slice())?;
        bincode::deserialize(&plain)
            .map_err(|e| QuarryError::internal(format!("posting decode failed: {e}")))
    }

    /// Size of the compressed representation in bytes.
    pub fn packed_len(&self) -> usize {
        self.0.len()
    }
}

impl IndexValue for CompressedOccurrences {
    fn merge(self, other: Self) -> Result<Self> {
        let combined = self.unwrap()?.union(&other.unwrap()?);
        CompressedOccurrences::wrap(&combined)
    }

    fn without_docs(&self, docs: &DocIdSet) -> Result<Option<Self>> {
        match self.unwrap()?.without_docs(docs) {
            Some(remaining) => Ok(Some(CompressedOccurrences::wrap(&remaining)?)),
            None => Ok(None),
        }
    }
}

/// Presents plain occurrence values over an index storing them compressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedIndex<I> {
    inner: I,
}

impl<I: Default> Default for CompressedIndex<I> {
    fn default() -> Self {
        CompressedIndex { inner: I::default() }
    }
}

impl<I> CompressedIndex<I> {
    pub fn new(inner: I) -> Self {
        CompressedIndex { inner }
    }
}

impl<K, I> TermIndex for CompressedIndex<I>
where
    K: IndexKey,
    I: TermIndex<Key = K, Value = CompressedOccurrences>,
{
    type Key = K;
    type Value = Occurrences;

    fn insert_list<F>(&mut self, op: F, items: Vec<(K, Occurrences)>) -> Result<()>
    where
        F: Fn(Occurrences, Occurrences) -> Result<Occurrences>,
    {
        // The combine crosses the representation boundary: decompress both
        // sides, apply the caller's op, recompress.
        let packed = items
            .into_iter()
            .map(|(k, v)| Ok((k, CompressedOccurrences::wrap(&v)?)))
            .collect::<Result<Vec<_>>>()?;
        self.inner.insert_list(
            |a, b| CompressedOccurrences::wrap(&op(a.unwrap()?, b.unwrap()?)?),
            packed,
        )
    }

    fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()> {
        self.inner.delete_docs(docs)
    }

    fn search(&self, mode: SearchMode, key: &K) -> Result<Vec<(K, Occurrences)>> {
        self.inner
            .search(mode, key)?
            .into_iter()
            .map(|(k, v)| Ok((k, v.unwrap()?)))
            .collect()
    }

    fn lookup_range(&self, lo: &K, hi: &K) -> Result<Vec<(K, Occurrences)>> {
        self.inner
            .lookup_range(lo, hi)?
            .into_iter()
            .map(|(k, v)| Ok((k, v.unwrap()?)))
            .collect()
    }

    fn union_with<F>(&mut self, op: F, other: Self) -> Result<()>
    where
        F: Fn(Occurrences, Occurrences) -> Result<Occurrences>,
    {
        self.inner.union_with(
            |a, b| CompressedOccurrences::wrap(&op(a.unwrap()?, b.unwrap()?)?),
            other.inner,
        )
    }

    fn map_values<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Occurrences) -> Result<Occurrences>,
    {
        self.inner
            .map_values(|v| CompressedOccurrences::wrap(&f(v.unwrap()?)?))
    }

    fn filter_map_values<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Occurrences) -> Result<Option<Occurrences>>,
    {
        self.inner.filter_map_values(|v| match f(v.unwrap()?)? {
            Some(kept) => Ok(Some(CompressedOccurrences::wrap(&kept)?)),
            None => Ok(None),
        })
    }

    fn keys(&self) -> Vec<K> {
        self.inner.keys()
    }

    fn to_list(&self) -> Vec<(K, Occurrences)> {
        self.inner
            .to_list()
            .into_iter()
            .filter_map(|(k, v)| v.unwrap().ok().map(|o| (k, o)))
            .collect()
    }

    fn term_count(&self) -> usize {
        self.inner.term_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::Positions;
    use crate::index::term::BTreeIndex;
    use proptest::prelude::*;

    type TextIndex = CompressedIndex<BTreeIndex<String, CompressedOccurrences>>;

    fn occ(entries: &[(u64, &[u32])]) -> Occurrences {
        entries
            .iter()
            .map(|(d, ps)| (*d, Positions::from_vec(ps.to_vec())))
            .collect()
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let original = occ(&[(1, &[0, 5, 9]), (42, &[3])]);
        let packed = CompressedOccurrences::wrap(&original).unwrap();
        assert_eq!(packed.unwrap().unwrap(), original);
    }

    #[test]
    fn test_insert_combines_through_compression() {
        let mut index = TextIndex::default();
        index
            .insert_list(IndexValue::merge, vec![("hello".to_string(), occ(&[(1, &[0])]))])
            .unwrap();
        index
            .insert_list(IndexValue::merge, vec![("hello".to_string(), occ(&[(2, &[4])]))])
            .unwrap();

        let hits = index.search(SearchMode::Case, &"hello".to_string()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, occ(&[(1, &[0]), (2, &[4])]));
    }

    #[test]
    fn test_delete_docs_through_compression() {
        let mut index = TextIndex::default();
        index
            .insert_list(
                IndexValue::merge,
                vec![("hello".to_string(), occ(&[(1, &[0]), (2, &[4])]))],
            )
            .unwrap();

        let gone: DocIdSet = [1].into_iter().collect();
        index.delete_docs(&gone).unwrap();
        let hits = index.search(SearchMode::Case, &"hello".to_string()).unwrap();
        assert_eq!(hits[0].1, occ(&[(2, &[4])]));

        let gone: DocIdSet = [2].into_iter().collect();
        index.delete_docs(&gone).unwrap();
        assert!(index.is_empty());
    }

    proptest! {
        #[test]
        fn codec_roundtrip(
            entries in prop::collection::btree_map(
                1u64..500,
                prop::collection::vec(0u32..1000, 1..20),
                0..20,
            )
        ) {
            let original: Occurrences = entries
                .into_iter()
                .map(|(d, ps)| (d, Positions::from_vec(ps)))
                .collect();
            let packed = CompressedOccurrences::wrap(&original).unwrap();
            prop_assert_eq!(packed.unwrap().unwrap(), original);
        }
    }
}
