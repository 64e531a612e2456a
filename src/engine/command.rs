//! The command surface the control plane speaks.
//!
//! Commands are plain data; the engine consumes them and answers with a
//! [`CommandResult`]. Transport, authentication and concrete syntax belong
//! to the caller layer.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::doc::{DocId, Document};
use crate::query::Query;
use crate::result::{Completion, ContextHits};
use crate::schema::ContextSchema;

/// A command against the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Execute a query and return a page of document hits.
    Search { query: Query, offset: usize, limit: usize },

    /// Execute a query and return the best word completions.
    Completion { query: Query, limit: usize },

    /// Insert a new document. Fails if the URI already exists or the
    /// document mentions a context the schema does not have.
    Insert { document: Document },

    /// Replace an existing document. Fails if the URI is unknown.
    Update { document: Document },

    /// Delete every document whose URI is listed; unknown URIs are ignored.
    BatchDelete { uris: BTreeSet<String> },

    /// Create a context. Fails if it exists or its type is unregistered.
    InsertContext { context: String, schema: ContextSchema },

    /// Drop a context with all its postings. Idempotent.
    DeleteContext { context: String },

    /// Persist the whole indexer to a file.
    StoreIndex { path: PathBuf },

    /// Replace the live indexer with a persisted one.
    LoadIndex { path: PathBuf },

    /// Run commands in order, aborting at the first failure.
    Sequence { commands: Vec<Command> },

    /// Liveness and metrics.
    Status,

    /// Does nothing, successfully.
    Noop,
}

/// One ranked document hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub doc_id: DocId,
    pub score: f64,
    pub boost: f64,
    pub document: Document,
    /// Context → word → positions the document was matched at.
    pub contexts: ContextHits,
}

/// A page of ranked hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub offset: usize,
    /// Total number of matched documents, before paging.
    pub total: usize,
    pub hits: Vec<RankedHit>,
}

/// What a command evaluates to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "res", rename_all = "snake_case")]
pub enum CommandResult {
    /// The command succeeded without producing data.
    Ok,
    Search { result: SearchResult },
    Completion { words: Vec<Completion> },
    Status { status: serde_json::Value },
}
