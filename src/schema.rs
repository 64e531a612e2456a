//! Context schema.
//!
//! The schema is authoritative for which contexts exist and how their terms
//! are analyzed, validated, and weighted. Its keys always equal the context
//! index's context set; the engine changes both in the same transition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerKind;
use crate::error::{QuarryError, Result};

/// Boost applied to documents matched through a context that declares no
/// weight of its own.
pub const DEF_SCORE: f64 = 1.0;

/// Per-context configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSchema {
    /// Name of the registered context type ("text", "int", "date", ...).
    /// Re-linked against the live type registry when an indexer is loaded.
    #[serde(rename = "type")]
    pub cx_type: String,

    /// How content and query terms for this context are analyzed.
    #[serde(default)]
    pub analyzer: AnalyzerKind,

    /// Multiplicative weight applied to documents matched through this
    /// context. Must be strictly positive when present; [`DEF_SCORE`] when
    /// absent.
    #[serde(default)]
    pub weight: Option<f64>,

    /// Whether the context participates in queries that name no contexts.
    #[serde(default = "default_true")]
    pub default: bool,
}

fn default_true() -> bool {
    true
}

impl ContextSchema {
    /// A schema entry of the given type with defaults for the rest.
    pub fn new(cx_type: impl Into<String>) -> Self {
        ContextSchema {
            cx_type: cx_type.into(),
            analyzer: AnalyzerKind::Standard,
            weight: None,
            default: true,
        }
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerKind) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    /// The weight to boost matched documents with.
    pub fn boost(&self) -> f64 {
        self.weight.unwrap_or(DEF_SCORE)
    }

    /// Reject entries the engine must not accept: a non-positive weight.
    pub fn validate(&self) -> Result<()> {
        if let Some(w) = self.weight {
            if !(w > 0.0) {
                return Err(QuarryError::invalid_input(format!(
                    "context weight must be positive, got {w}"
                )));
            }
        }
        Ok(())
    }
}

/// All context schemas, keyed by context name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    contexts: BTreeMap<String, ContextSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, context: &str) -> Option<&ContextSchema> {
        self.contexts.get(context)
    }

    pub fn contains(&self, context: &str) -> bool {
        self.contexts.contains_key(context)
    }

    pub fn insert(&mut self, context: impl Into<String>, schema: ContextSchema) {
        self.contexts.insert(context.into(), schema);
    }

    pub fn remove(&mut self, context: &str) -> Option<ContextSchema> {
        self.contexts.remove(context)
    }

    /// All context names, in order.
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.keys().map(|s| s.as_str()).collect()
    }

    /// Names of the contexts queries fall back to when none are named.
    pub fn default_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .filter(|(_, s)| s.default)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextSchema)> {
        self.contexts.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
