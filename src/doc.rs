//! Document model.
//!
//! A document is identified by a URI and carries two maps: `contents`, the
//! per-context text that gets analyzed and indexed, and `fields`, the stored
//! payload returned with search hits. The engine assigns each document an
//! opaque numeric [`DocId`] on first insert; ids are never reused within a
//! session.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque numeric document identifier, unique within a live index.
pub type DocId = u64;

/// A set of document ids, used for bulk deletion.
pub type DocIdSet = BTreeSet<DocId>;

/// A document: a URI, content to index per context, and stored fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier of the document across the document table.
    pub uri: String,

    /// Text to be analyzed and indexed, keyed by context name.
    #[serde(default)]
    pub contents: HashMap<String, String>,

    /// Stored key/value payload returned with hits; never indexed.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl Document {
    /// Create a new empty document with the given URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            contents: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    /// Add content to be indexed under the named context.
    pub fn add_content(mut self, context: impl Into<String>, text: impl Into<String>) -> Self {
        self.contents.insert(context.into(), text.into());
        self
    }

    /// Add a stored payload field.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a stored field value.
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// The context names this document mentions.
    pub fn context_names(&self) -> Vec<&str> {
        self.contents.keys().map(|s| s.as_str()).collect()
    }
}
