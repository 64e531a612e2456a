//! # Quarry
//!
//! An in-memory, multi-context full-text search engine with a
//! command-oriented control plane.
//!
//! Documents are ingested per *context* — a named field with its own type,
//! analyzer and weight — into two parallel stores: a document table and a
//! context index of positional posting lists. Queries are small algebraic
//! trees evaluated against the context index, combined through an
//! intermediate-result algebra, joined against the document table and
//! ranked.
//!
//! ## Example
//!
//! ```
//! use quarry::{Command, Document, Engine, MatchCase, Query};
//! use quarry::schema::ContextSchema;
//!
//! let engine = Engine::new();
//! engine.run(Command::InsertContext {
//!     context: "content".to_string(),
//!     schema: ContextSchema::new("text"),
//! })?;
//! engine.run(Command::Insert {
//!     document: Document::new("id://1").add_content("content", "hello world"),
//! })?;
//!
//! let result = engine.run(Command::Search {
//!     query: Query::word(MatchCase::NoCase, "hel"),
//!     offset: 0,
//!     limit: 10,
//! })?;
//! # let quarry::CommandResult::Search { result } = result else { unreachable!() };
//! assert_eq!(result.total, 1);
//! # Ok::<(), quarry::QuarryError>(())
//! ```

pub mod analysis;
pub mod doc;
pub mod engine;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod result;
pub mod schema;
pub mod table;

// Re-exports for the public API
pub use analysis::{Analyzer, AnalyzerKind, KeywordAnalyzer, StandardAnalyzer};
pub use doc::{DocId, DocIdSet, Document};
pub use engine::{Command, CommandResult, Engine, Indexer, RankedHit, SearchResult};
pub use error::{QuarryError, Result};
pub use index::{ContextIndex, Occurrences, Positions, SearchMode, TypeRegistry};
pub use query::fuzzy::FuzzyConfig;
pub use query::intermediate::Intermediate;
pub use query::processor::{CancelToken, ProcessConfig, QueryProcessor};
pub use query::{BinOp, MatchCase, Query};
pub use result::{Completion, DocHit, DocHits, WordHit, WordHits};
pub use schema::{ContextSchema, Schema};
pub use table::DocTable;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
