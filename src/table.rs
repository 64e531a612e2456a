//! The document table.
//!
//! Authoritative for document existence: maps `DocId ↔ URI` and `DocId` to
//! the stored document payload. Ids are minted sequentially on first insert
//! of a URI and never reused within a session. Stored payloads are kept
//! zstd-compressed ([`DocEntry`]), the same CPU-for-RAM trade the text index
//! makes for its posting lists.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::doc::{DocId, DocIdSet, Document};
use crate::error::{QuarryError, Result};

/// A stored document, compressed. `unwrap(wrap(d)) == d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEntry(Vec<u8>);

impl DocEntry {
    pub fn wrap(doc: &Document) -> Result<Self> {
        let plain = bincode::serialize(doc)
            .map_err(|e| QuarryError::internal(format!("document encode failed: {e}")))?;
        Ok(DocEntry(zstd::encode_all(plain.as_slice(), 3)?))
    }

    pub fn unwrap(&self) -> Result<Document> {
        let plain = zstd::decode_all(self.0.as_slice())?;
        bincode::deserialize(&plain)
            .map_err(|e| QuarryError::internal(format!("document decode failed: {e}")))
    }
}

/// Maps document ids to stored documents and URIs to document ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocTable {
    entries: BTreeMap<DocId, DocEntry>,
    by_uri: BTreeMap<String, DocId>,
    next_id: DocId,
}

impl DocTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn lookup(&self, id: DocId) -> Result<Option<Document>> {
        self.entries.get(&id).map(DocEntry::unwrap).transpose()
    }

    pub fn id_of(&self, uri: &str) -> Option<DocId> {
        self.by_uri.get(uri).copied()
    }

    pub fn lookup_by_uri(&self, uri: &str) -> Result<Option<Document>> {
        match self.by_uri.get(uri) {
            Some(id) => self.lookup(*id),
            None => Ok(None),
        }
    }

    /// Insert a document, minting a fresh id. Idempotent on URI: if the URI
    /// is already present its existing id is returned and the table is left
    /// unchanged.
    pub fn insert(&mut self, doc: &Document) -> Result<DocId> {
        if let Some(id) = self.by_uri.get(&doc.uri) {
            return Ok(*id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_uri.insert(doc.uri.clone(), id);
        self.entries.insert(id, DocEntry::wrap(doc)?);
        Ok(id)
    }

    /// Replace the document stored under `id`. The URI mapping follows the
    /// new document's URI.
    pub fn update(&mut self, id: DocId, doc: &Document) -> Result<()> {
        let old = self
            .entries
            .get(&id)
            .ok_or_else(|| QuarryError::conflict(format!("document {id} does not exist")))?
            .unwrap()?;
        if old.uri != doc.uri {
            self.by_uri.remove(&old.uri);
            self.by_uri.insert(doc.uri.clone(), id);
        }
        self.entries.insert(id, DocEntry::wrap(doc)?);
        Ok(())
    }

    /// Apply `f` to the document stored under `id`, if present.
    pub fn adjust<F>(&mut self, f: F, id: DocId) -> Result<()>
    where
        F: FnOnce(Document) -> Document,
    {
        if let Some(entry) = self.entries.get(&id) {
            let updated = f(entry.unwrap()?);
            self.update(id, &updated)?;
        }
        Ok(())
    }

    /// Apply `f` to the document stored under `uri`, if present.
    pub fn adjust_by_uri<F>(&mut self, f: F, uri: &str) -> Result<()>
    where
        F: FnOnce(Document) -> Document,
    {
        if let Some(id) = self.by_uri.get(uri).copied() {
            self.adjust(f, id)?;
        }
        Ok(())
    }

    /// Delete by id. Returns the removed document's URI, if any.
    pub fn delete(&mut self, id: DocId) -> Result<Option<String>> {
        match self.entries.remove(&id) {
            Some(entry) => {
                let doc = entry.unwrap()?;
                self.by_uri.remove(&doc.uri);
                Ok(Some(doc.uri))
            }
            None => Ok(None),
        }
    }

    /// Delete by URI. Returns the removed document's id, if any.
    pub fn delete_by_uri(&mut self, uri: &str) -> Result<Option<DocId>> {
        match self.by_uri.remove(uri) {
            Some(id) => {
                self.entries.remove(&id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Remove every document whose id is in `ids`.
    pub fn difference(&mut self, ids: &DocIdSet) -> Result<()> {
        for id in ids {
            self.delete(*id)?;
        }
        Ok(())
    }

    /// Remove every document whose URI is in `uris`. Missing URIs are
    /// ignored. Returns the ids that were removed.
    pub fn difference_by_uri(&mut self, uris: &BTreeSet<String>) -> Result<DocIdSet> {
        let mut removed = DocIdSet::new();
        for uri in uris {
            if let Some(id) = self.delete_by_uri(uri)? {
                removed.insert(id);
            }
        }
        Ok(removed)
    }

    /// Apply `f` to every stored document.
    pub fn map<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Document) -> Document,
    {
        let ids: Vec<DocId> = self.entries.keys().copied().collect();
        for id in ids {
            self.adjust(&mut f, id)?;
        }
        Ok(())
    }

    /// Keep only documents satisfying the predicate.
    pub fn filter<F>(&mut self, mut pred: F) -> Result<()>
    where
        F: FnMut(&Document) -> bool,
    {
        let mut gone = DocIdSet::new();
        for (id, entry) in &self.entries {
            if !pred(&entry.unwrap()?) {
                gone.insert(*id);
            }
        }
        self.difference(&gone)
    }

    /// Renumber document ids with `f`. `f` must be injective over the live
    /// ids; a collision is an internal error.
    pub fn map_keys<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(DocId) -> DocId,
    {
        let mut entries = BTreeMap::new();
        for (id, entry) in std::mem::take(&mut self.entries) {
            let new_id = f(id);
            if entries.insert(new_id, entry).is_some() {
                return Err(QuarryError::internal(format!(
                    "document id mapping collides at {new_id}"
                )));
            }
        }
        self.by_uri.values_mut().for_each(|id| *id = f(*id));
        self.next_id = entries.keys().max().map(|m| m + 1).unwrap_or(0);
        self.entries = entries;
        Ok(())
    }

    /// All live documents as a map.
    pub fn to_map(&self) -> Result<BTreeMap<DocId, Document>> {
        self.entries
            .iter()
            .map(|(id, entry)| Ok((*id, entry.unwrap()?)))
            .collect()
    }

    /// All live document ids.
    pub fn doc_ids(&self) -> DocIdSet {
        self.entries.keys().copied().collect()
    }

    /// Merge another table into this one.
    ///
    /// Precondition: the id sets and the URI sets of the two tables are
    /// disjoint; violated ids surface as an internal error.
    pub fn union(&mut self, other: DocTable) -> Result<()> {
        for (id, entry) in other.entries {
            if self.entries.contains_key(&id) {
                return Err(QuarryError::internal(format!(
                    "document tables are not disjoint at id {id}"
                )));
            }
            self.entries.insert(id, entry);
        }
        for (uri, id) in other.by_uri {
            if self.by_uri.contains_key(&uri) {
                return Err(QuarryError::internal(format!(
                    "document tables are not disjoint at uri '{uri}'"
                )));
            }
            self.by_uri.insert(uri, id);
        }
        self.next_id = self.next_id.max(other.next_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(uri: &str) -> Document {
        Document::new(uri).add_field("title", uri.to_uppercase())
    }

    #[test]
    fn test_doc_entry_roundtrip() {
        let original = doc("id://1").add_content("content", "hello world");
        let entry = DocEntry::wrap(&original).unwrap();
        assert_eq!(entry.unwrap().unwrap(), original);
    }

    #[test]
    fn test_insert_is_idempotent_on_uri() {
        let mut table = DocTable::new();
        let id1 = table.insert(&doc("id://1")).unwrap();
        let id2 = table.insert(&doc("id://1").add_field("extra", "ignored")).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(table.len(), 1);
        // The original payload survives the idempotent re-insert.
        assert!(table.lookup(id1).unwrap().unwrap().get_field("extra").is_none());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = DocTable::new();
        let id1 = table.insert(&doc("id://1")).unwrap();
        table.delete(id1).unwrap();
        let id2 = table.insert(&doc("id://1")).unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_update_moves_uri_mapping() {
        let mut table = DocTable::new();
        let id = table.insert(&doc("id://old")).unwrap();
        table.update(id, &doc("id://new")).unwrap();
        assert_eq!(table.id_of("id://new"), Some(id));
        assert_eq!(table.id_of("id://old"), None);

        let err = table.update(999, &doc("id://x")).unwrap_err();
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_difference_by_uri_ignores_missing() {
        let mut table = DocTable::new();
        let id = table.insert(&doc("id://1")).unwrap();
        table.insert(&doc("id://2")).unwrap();

        let uris: BTreeSet<String> = ["id://1".to_string(), "id://ghost".to_string()]
            .into_iter()
            .collect();
        let removed = table.difference_by_uri(&uris).unwrap();
        assert_eq!(removed, [id].into_iter().collect());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_filter_and_adjust() {
        let mut table = DocTable::new();
        table.insert(&doc("id://keep")).unwrap();
        let id = table.insert(&doc("id://drop")).unwrap();

        table
            .adjust(|d| d.add_field("marker", "x"), id)
            .unwrap();
        assert_eq!(
            table.lookup(id).unwrap().unwrap().get_field("marker"),
            Some("x")
        );

        table.filter(|d| d.uri == "id://keep").unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.id_of("id://drop").is_none());
    }

    #[test]
    fn test_union_disjoint_precondition() {
        let mut a = DocTable::new();
        a.insert(&doc("id://1")).unwrap();
        let mut b = DocTable::new();
        b.insert(&doc("id://1")).unwrap();
        assert_eq!(a.union(b).unwrap_err().code(), 500);
    }
}
