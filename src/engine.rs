//! The engine: one live indexer behind a command interface.
//!
//! The indexer bundles the context index, the document table and the schema;
//! the three always change together. Access is single-writer/multi-reader:
//! queries clone an `Arc` snapshot and never block, a writer builds the next
//! indexer from a copy and publishes it with a pointer swap. A command
//! either publishes its whole transition or leaves the previous indexer in
//! place — there is no partially applied command, on any error path.

pub mod command;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::doc::{DocIdSet, Document};
use crate::error::{QuarryError, Result};
use crate::index::context::{ContextIndex, TypeRegistry};
use crate::index::posting::{Occurrences, Positions};
use crate::persist;
use crate::query::processor::{CancelToken, ProcessConfig, QueryProcessor};
use crate::result;
use crate::schema::Schema;
use crate::table::DocTable;

pub use self::command::{Command, CommandResult, RankedHit, SearchResult};

/// The engine's entire mutable state: context index, document table, schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Indexer {
    pub index: ContextIndex,
    pub table: DocTable,
    pub schema: Schema,
}

impl Indexer {
    /// The context sets of schema and index must be identical; anything else
    /// is a broken invariant, not an empty result.
    pub fn check_consistency(&self) -> Result<()> {
        if self.schema.context_names() != self.index.contexts() {
            return Err(QuarryError::internal(
                "schema and context index disagree about the set of contexts",
            ));
        }
        Ok(())
    }
}

/// An in-memory, multi-context full-text search engine.
pub struct Engine {
    indexer: RwLock<Arc<Indexer>>,
    registry: TypeRegistry,
    config: ProcessConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An empty engine with the default configuration and context types.
    pub fn new() -> Self {
        Self::with_config(ProcessConfig::default())
    }

    pub fn with_config(config: ProcessConfig) -> Self {
        Engine {
            indexer: RwLock::new(Arc::new(Indexer::default())),
            registry: TypeRegistry::default(),
            config,
        }
    }

    /// Replace the context type registry. Types must be registered before
    /// contexts of that type are created or loaded.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// A consistent snapshot of the live indexer. Snapshots stay valid while
    /// writers publish newer versions.
    pub fn snapshot(&self) -> Arc<Indexer> {
        self.indexer.read().clone()
    }

    /// Execute a command.
    pub fn run(&self, command: Command) -> Result<CommandResult> {
        self.run_cancellable(command, CancelToken::new())
    }

    /// Execute a command with a cancellation token. Only query evaluation
    /// checks the token; mutations are short and atomic.
    pub fn run_cancellable(&self, command: Command, cancel: CancelToken) -> Result<CommandResult> {
        match command {
            Command::Search { query, offset, limit } => {
                let snapshot = self.snapshot();
                let processor = QueryProcessor::new(
                    &self.config,
                    &snapshot.schema,
                    &self.registry,
                    &snapshot.index,
                    cancel,
                );
                let intermediate = processor.process(query)?;
                let hits = result::doc_hits(&intermediate, &snapshot.table)?;
                let total = hits.len();
                let page = result::rank_docs(hits)
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .map(|(doc_id, hit)| RankedHit {
                        doc_id,
                        score: hit.info.score,
                        boost: hit.info.boost,
                        document: hit.info.document,
                        contexts: hit.contexts,
                    })
                    .collect();
                debug!(total, "search finished");
                Ok(CommandResult::Search {
                    result: SearchResult { offset, total, hits: page },
                })
            }

            Command::Completion { query, limit } => {
                let snapshot = self.snapshot();
                let processor = QueryProcessor::new(
                    &self.config,
                    &snapshot.schema,
                    &self.registry,
                    &snapshot.index,
                    cancel,
                );
                let intermediate = processor.process(query)?;
                let mut words = result::rank_completions(result::word_hits(&intermediate));
                words.truncate(limit);
                Ok(CommandResult::Completion { words })
            }

            Command::Insert { document } => {
                self.mutate(|next, registry| {
                    if next.table.id_of(&document.uri).is_some() {
                        return Err(QuarryError::conflict(format!(
                            "document '{}' already exists",
                            document.uri
                        )));
                    }
                    let analyzed = analyze(next, registry, &document)?;
                    let id = next.table.insert(&document)?;
                    apply_postings(next, id, analyzed)?;
                    debug!(uri = %document.uri, id, "inserted document");
                    Ok(())
                })?;
                Ok(CommandResult::Ok)
            }

            Command::Update { document } => {
                self.mutate(|next, registry| {
                    let id = next.table.id_of(&document.uri).ok_or_else(|| {
                        QuarryError::conflict(format!(
                            "document '{}' does not exist",
                            document.uri
                        ))
                    })?;
                    let analyzed = analyze(next, registry, &document)?;
                    let gone: DocIdSet = [id].into_iter().collect();
                    next.index.delete_docs(&gone)?;
                    next.table.update(id, &document)?;
                    apply_postings(next, id, analyzed)?;
                    debug!(uri = %document.uri, id, "updated document");
                    Ok(())
                })?;
                Ok(CommandResult::Ok)
            }

            Command::BatchDelete { uris } => {
                self.mutate(|next, _| {
                    let removed = next.table.difference_by_uri(&uris)?;
                    if !removed.is_empty() {
                        next.index.delete_docs(&removed)?;
                    }
                    info!(requested = uris.len(), removed = removed.len(), "batch delete");
                    Ok(())
                })?;
                Ok(CommandResult::Ok)
            }

            Command::InsertContext { context, schema } => {
                self.mutate(|next, registry| {
                    if next.schema.contains(&context) {
                        return Err(QuarryError::conflict(format!(
                            "context '{context}' already exists"
                        )));
                    }
                    let ty = registry
                        .get(&schema.cx_type)
                        .ok_or_else(|| QuarryError::unknown_type(schema.cx_type.clone()))?;
                    schema.validate()?;
                    next.index.insert_context(context.clone(), (ty.new_index)())?;
                    next.schema.insert(context.clone(), schema.clone());
                    info!(context = %context, kind = ty.name, "created context");
                    Ok(())
                })?;
                Ok(CommandResult::Ok)
            }

            Command::DeleteContext { context } => {
                self.mutate(|next, _| {
                    let existed = next.index.delete_context(&context);
                    next.schema.remove(&context);
                    if existed {
                        info!(context = %context, "deleted context");
                    }
                    Ok(())
                })?;
                Ok(CommandResult::Ok)
            }

            Command::StoreIndex { path } => {
                let snapshot = self.snapshot();
                persist::store_indexer(&path, &snapshot)?;
                Ok(CommandResult::Ok)
            }

            Command::LoadIndex { path } => {
                let loaded = persist::load_indexer(&path, &self.registry)?;
                *self.indexer.write() = Arc::new(loaded);
                Ok(CommandResult::Ok)
            }

            Command::Sequence { commands } => {
                let mut last = CommandResult::Ok;
                for (index, child) in commands.into_iter().enumerate() {
                    last = self
                        .run_cancellable(child, cancel.clone())
                        .map_err(|e| at_child(index, e))?;
                }
                Ok(last)
            }

            Command::Status => {
                let snapshot = self.snapshot();
                let term_counts: BTreeMap<&str, usize> =
                    snapshot.index.term_counts().into_iter().collect();
                let contexts: Vec<serde_json::Value> = snapshot
                    .schema
                    .iter()
                    .map(|(name, entry)| {
                        json!({
                            "name": name,
                            "type": entry.cx_type,
                            "weight": entry.boost(),
                            "default": entry.default,
                            "terms": term_counts.get(name).copied().unwrap_or(0),
                        })
                    })
                    .collect();
                Ok(CommandResult::Status {
                    status: json!({
                        "doc_count": snapshot.table.len(),
                        "contexts": contexts,
                        "types": self.registry.names(),
                    }),
                })
            }

            Command::Noop => Ok(CommandResult::Ok),
        }
    }

    /// Run a state transition: copy the live indexer, apply `f`, publish the
    /// copy. An error on any path leaves the previous indexer in place.
    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Indexer, &TypeRegistry) -> Result<()>,
    {
        let mut guard = self.indexer.write();
        let mut next = (**guard).clone();
        f(&mut next, &self.registry)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

/// Tokenize and validate a document's contents against the schema. Pure
/// read; runs before any part of the transition mutates state.
fn analyze(
    indexer: &Indexer,
    registry: &TypeRegistry,
    document: &Document,
) -> Result<Vec<(String, Vec<(String, Positions)>)>> {
    let mut analyzed = Vec::with_capacity(document.contents.len());
    for (context, content) in &document.contents {
        let entry = indexer.schema.get(context).ok_or_else(|| {
            QuarryError::conflict(format!("document mentions unknown context '{context}'"))
        })?;
        let ty = registry
            .get(&entry.cx_type)
            .ok_or_else(|| QuarryError::unknown_type(entry.cx_type.clone()))?;
        let analyzer = entry.analyzer.analyzer();

        let mut terms: BTreeMap<String, Positions> = BTreeMap::new();
        for (position, term) in analyzer.tokenize(content) {
            if !(ty.validate)(&term) {
                return Err(QuarryError::invalid_input(format!(
                    "token '{term}' is not valid for context '{context}'"
                )));
            }
            terms.entry(term).or_default().insert(position);
        }
        analyzed.push((context.clone(), terms.into_iter().collect()));
    }
    Ok(analyzed)
}

/// Insert analyzed postings for one document id.
fn apply_postings(
    indexer: &mut Indexer,
    id: crate::doc::DocId,
    analyzed: Vec<(String, Vec<(String, Positions)>)>,
) -> Result<()> {
    for (context, terms) in analyzed {
        let items = terms
            .into_iter()
            .map(|(term, positions)| (term, Occurrences::single(id, positions)))
            .collect();
        indexer.index.insert_list_cx(&context, items)?;
    }
    Ok(())
}

/// Tag an error with the index of the sequence child it came from.
fn at_child(index: usize, err: QuarryError) -> QuarryError {
    let prefix = format!("command {index}");
    match err {
        QuarryError::InvalidInput(m) => QuarryError::InvalidInput(format!("{prefix}: {m}")),
        QuarryError::NotFound(m) => QuarryError::NotFound(format!("{prefix}: {m}")),
        QuarryError::Conflict(m) => QuarryError::Conflict(format!("{prefix}: {m}")),
        QuarryError::UnknownType(m) => QuarryError::UnknownType(format!("{prefix}: {m}")),
        QuarryError::Unsupported(m) => QuarryError::Unsupported(format!("{prefix}: {m}")),
        QuarryError::Internal(m) => QuarryError::Internal(format!("{prefix}: {m}")),
        QuarryError::Io(e) => {
            QuarryError::Io(std::io::Error::new(e.kind(), format!("{prefix}: {e}")))
        }
        QuarryError::Cancelled => QuarryError::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerKind;
    use crate::schema::ContextSchema;

    fn engine_with_content_context() -> Engine {
        let engine = Engine::new();
        engine
            .run(Command::InsertContext {
                context: "content".to_string(),
                schema: ContextSchema::new("text"),
            })
            .unwrap();
        engine
    }

    #[test]
    fn test_insert_conflicts_on_existing_uri() {
        let engine = engine_with_content_context();
        let doc = Document::new("id://1").add_content("content", "hello");
        engine.run(Command::Insert { document: doc.clone() }).unwrap();
        let err = engine.run(Command::Insert { document: doc }).unwrap_err();
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_insert_rejects_unknown_context() {
        let engine = engine_with_content_context();
        let doc = Document::new("id://1").add_content("missing", "hello");
        let err = engine.run(Command::Insert { document: doc }).unwrap_err();
        assert_eq!(err.code(), 409);
        // Nothing was applied.
        assert_eq!(engine.snapshot().table.len(), 0);
    }

    #[test]
    fn test_update_requires_existing_document() {
        let engine = engine_with_content_context();
        let doc = Document::new("id://ghost").add_content("content", "hello");
        let err = engine.run(Command::Update { document: doc }).unwrap_err();
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_insert_context_errors() {
        let engine = engine_with_content_context();

        let err = engine
            .run(Command::InsertContext {
                context: "content".to_string(),
                schema: ContextSchema::new("text"),
            })
            .unwrap_err();
        assert_eq!(err.code(), 409);

        let err = engine
            .run(Command::InsertContext {
                context: "geo".to_string(),
                schema: ContextSchema::new("hypercube"),
            })
            .unwrap_err();
        assert_eq!(err.code(), 410);

        let err = engine
            .run(Command::InsertContext {
                context: "weighted".to_string(),
                schema: ContextSchema::new("text").with_weight(-1.0),
            })
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_delete_context_is_idempotent() {
        let engine = engine_with_content_context();
        assert!(matches!(
            engine.run(Command::DeleteContext { context: "content".to_string() }).unwrap(),
            CommandResult::Ok
        ));
        assert!(matches!(
            engine.run(Command::DeleteContext { context: "content".to_string() }).unwrap(),
            CommandResult::Ok
        ));
        engine.snapshot().check_consistency().unwrap();
    }

    #[test]
    fn test_sequence_aborts_and_tags_child() {
        let engine = engine_with_content_context();
        let err = engine
            .run(Command::Sequence {
                commands: vec![
                    Command::Insert {
                        document: Document::new("id://1").add_content("content", "a"),
                    },
                    Command::Insert {
                        document: Document::new("id://1").add_content("content", "b"),
                    },
                    Command::Insert {
                        document: Document::new("id://2").add_content("content", "c"),
                    },
                ],
            })
            .unwrap_err();
        assert_eq!(err.code(), 409);
        assert!(err.to_string().contains("command 1"));
        // The first child applied; the third never ran.
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.table.len(), 1);
        assert!(snapshot.table.id_of("id://2").is_none());
    }

    #[test]
    fn test_status_reports_contexts() {
        let engine = engine_with_content_context();
        engine
            .run(Command::Insert {
                document: Document::new("id://1").add_content("content", "hello world"),
            })
            .unwrap();

        let CommandResult::Status { status } = engine.run(Command::Status).unwrap() else {
            panic!("expected a status result");
        };
        assert_eq!(status["doc_count"], 1);
        assert_eq!(status["contexts"][0]["name"], "content");
        assert_eq!(status["contexts"][0]["terms"], 2);
    }

    #[test]
    fn test_schema_and_index_stay_consistent() {
        let engine = Engine::new();
        for (name, ty) in [("a", "text"), ("b", "int"), ("c", "date")] {
            engine
                .run(Command::InsertContext {
                    context: name.to_string(),
                    schema: ContextSchema::new(ty).with_analyzer(AnalyzerKind::Keyword),
                })
                .unwrap();
        }
        engine.run(Command::DeleteContext { context: "b".to_string() }).unwrap();
        engine.snapshot().check_consistency().unwrap();
    }
}
