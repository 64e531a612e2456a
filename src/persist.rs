//! Binary persistence of the whole indexer.
//!
//! The dump is a single bincode stream: a version, the tag list of context
//! type implementations in use, then the context index, document table and
//! schema. On load the schema's type references are re-linked against the
//! live type registry by name; a tag the registry does not know fails with
//! the unknown-type error before any state is swapped in.
//!
//! The format is not guaranteed stable across crate versions; the version
//! field exists to reject mismatched dumps, not to migrate them.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::Indexer;
use crate::error::{QuarryError, Result};
use crate::index::context::TypeRegistry;

const DUMP_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexerDump {
    version: u32,
    type_tags: Vec<String>,
    indexer: Indexer,
}

/// Write the indexer to `path`.
pub fn store_indexer(path: &Path, indexer: &Indexer) -> Result<()> {
    let mut type_tags: Vec<String> = indexer
        .schema
        .iter()
        .map(|(_, entry)| entry.cx_type.clone())
        .collect();
    type_tags.sort();
    type_tags.dedup();

    let dump = IndexerDump { version: DUMP_VERSION, type_tags, indexer: indexer.clone() };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &dump)
        .map_err(|e| QuarryError::internal(format!("indexer encode failed: {e}")))?;
    info!(path = %path.display(), documents = indexer.table.len(), "stored indexer");
    Ok(())
}

/// Read an indexer back from `path`, re-linking its context types against
/// `registry`.
pub fn load_indexer(path: &Path, registry: &TypeRegistry) -> Result<Indexer> {
    let reader = BufReader::new(File::open(path)?);
    let dump: IndexerDump = bincode::deserialize_from(reader)
        .map_err(|e| QuarryError::internal(format!("indexer decode failed: {e}")))?;

    if dump.version != DUMP_VERSION {
        return Err(QuarryError::internal(format!(
            "unsupported indexer dump version {}",
            dump.version
        )));
    }

    for tag in &dump.type_tags {
        if registry.get(tag).is_none() {
            return Err(QuarryError::unknown_type(format!(
                "dump references context type '{tag}'"
            )));
        }
    }

    let indexer = dump.indexer;
    indexer.check_consistency()?;
    info!(path = %path.display(), documents = indexer.table.len(), "loaded indexer");
    Ok(indexer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerKind;
    use crate::index::context::AnyIndex;
    use crate::index::posting::{Occurrences, Positions};
    use crate::schema::ContextSchema;

    fn sample_indexer() -> Indexer {
        let mut indexer = Indexer::default();
        indexer.schema.insert("content", ContextSchema::new("text"));
        indexer.schema.insert(
            "publish_date",
            ContextSchema::new("date").with_analyzer(AnalyzerKind::Keyword),
        );
        indexer.index.insert_context("content", AnyIndex::empty_text()).unwrap();
        indexer.index.insert_context("publish_date", AnyIndex::empty_date()).unwrap();
        indexer
            .index
            .insert_list_cx(
                "content",
                vec![("hello".to_string(), Occurrences::single(0, Positions::single(0)))],
            )
            .unwrap();
        indexer
            .table
            .insert(&crate::doc::Document::new("id://1").add_field("title", "Hello"))
            .unwrap();
        indexer
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.bin");
        let original = sample_indexer();

        store_indexer(&path, &original).unwrap();
        let loaded = load_indexer(&path, &TypeRegistry::default()).unwrap();

        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.schema.context_names(), original.schema.context_names());
        let hits = loaded
            .index
            .search_with_cx(crate::index::term::SearchMode::Case, "content", "hello")
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_load_rejects_unknown_type_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.bin");
        store_indexer(&path, &sample_indexer()).unwrap();

        // A registry that only knows "text" must refuse the dump, which
        // also tags "date".
        let full = TypeRegistry::default();
        let mut restricted = TypeRegistry::empty();
        restricted.register(*full.get("text").unwrap()).unwrap();

        let err = load_indexer(&path, &restricted).unwrap_err();
        assert_eq!(err.code(), 410);
    }
}
