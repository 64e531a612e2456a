//! Query evaluation.
//!
//! The processor walks a [`Query`] tree against a consistent snapshot of the
//! context index and schema. Terms are normalized and validated per context,
//! raw posting results are limited (see [`limit_raw`]), and everything is
//! combined through the [`Intermediate`] algebra.
//!
//! Evaluation is read-only and cancellable: the token is checked between
//! per-context searches and between binary subqueries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuarryError, Result};
use crate::index::context::{ContextIndex, RawResult, TypeRegistry};
use crate::index::posting::Occurrences;
use crate::index::term::SearchMode;
use crate::query::fuzzy::FuzzyConfig;
use crate::query::intermediate::Intermediate;
use crate::query::{BinOp, MatchCase, Query};
use crate::schema::{ContextSchema, Schema};

/// Cooperative cancellation for queries.
///
/// Cancelling does not interrupt a running index operation; the processor
/// checks the token at combinator boundaries and aborts with
/// [`QuarryError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(QuarryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-engine query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Fuzzy-set generation for `MatchCase::Fuzzy` probes.
    #[serde(default)]
    pub fuzzy: FuzzyConfig,

    /// Keep at most this many words of a raw result. Zero disables.
    #[serde(default)]
    pub word_limit: usize,

    /// Stop extending a raw result once it covers this many documents.
    /// Zero disables.
    #[serde(default)]
    pub doc_limit: usize,

    /// Whether to run the query rewrite pass before evaluation.
    #[serde(default = "default_true")]
    pub optimize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            fuzzy: FuzzyConfig::default(),
            word_limit: 0,
            doc_limit: 0,
            optimize: true,
        }
    }
}

/// Walks a query tree against one snapshot of the index and schema.
pub struct QueryProcessor<'a> {
    config: &'a ProcessConfig,
    schema: &'a Schema,
    registry: &'a TypeRegistry,
    index: &'a ContextIndex,
    cancel: CancelToken,
}

impl<'a> QueryProcessor<'a> {
    pub fn new(
        config: &'a ProcessConfig,
        schema: &'a Schema,
        registry: &'a TypeRegistry,
        index: &'a ContextIndex,
        cancel: CancelToken,
    ) -> Self {
        QueryProcessor { config, schema, registry, index, cancel }
    }

    /// Evaluate `query` against the contexts marked as default, or whatever
    /// contexts the query itself names.
    pub fn process(&self, query: Query) -> Result<Intermediate> {
        let query = if self.config.optimize {
            crate::query::optimize(query)
        } else {
            query
        };
        let active = self.schema.default_contexts();
        debug!(contexts = active.len(), "evaluating query");
        self.eval(&active, &query)
    }

    fn eval(&self, contexts: &[String], query: &Query) -> Result<Intermediate> {
        match query {
            Query::Word { case, term } => match case {
                MatchCase::Case => self.eval_word(contexts, SearchMode::PrefixCase, term),
                MatchCase::NoCase => self.eval_word(contexts, SearchMode::PrefixNoCase, term),
                MatchCase::Fuzzy => self.eval_fuzzy(contexts, term, false),
            },
            Query::Phrase { case, phrase } => {
                // A one-word phrase is a word search.
                let mut words = phrase.split_whitespace();
                match (words.next(), words.next()) {
                    (None, _) => Ok(Intermediate::new()),
                    (Some(single), None) => {
                        let single = single.to_string();
                        self.eval(contexts, &Query::Word { case: *case, term: single })
                    }
                    _ => match case {
                        MatchCase::Case => self.eval_phrase(contexts, SearchMode::Case, phrase),
                        MatchCase::NoCase => self.eval_phrase(contexts, SearchMode::NoCase, phrase),
                        MatchCase::Fuzzy => self.eval_fuzzy(contexts, phrase, true),
                    },
                }
            }
            Query::Context { contexts: named, query } => {
                for context in named {
                    if !self.schema.contains(context) {
                        return Err(QuarryError::not_found(format!("context '{context}'")));
                    }
                }
                self.eval(named, query)
            }
            Query::Binary { op, left, right } => {
                let left = self.eval(contexts, left)?;
                self.cancel.check()?;
                let right = self.eval(contexts, right)?;
                Ok(match op {
                    BinOp::And => left.intersection(right),
                    BinOp::Or => left.union(right),
                    BinOp::AndNot => left.difference(right),
                })
            }
            Query::Range { lo, hi } => self.eval_range(contexts, lo, hi),
            Query::Boost { factor, query } => Ok(self.eval(contexts, query)?.boost_all(*factor)),
        }
    }

    /// Prefix-search one word across the active contexts, each with its own
    /// normalization of the term.
    fn eval_word(
        &self,
        contexts: &[String],
        mode: SearchMode,
        term: &str,
    ) -> Result<Intermediate> {
        let mut probes = Vec::with_capacity(contexts.len());
        let mut entries = Vec::with_capacity(contexts.len());
        for context in contexts {
            self.cancel.check()?;
            let entry = self.entry(context)?;
            let normalized = self.normalize_and_validate(context, entry, term)?;
            probes.push((context.clone(), normalized));
            entries.push(entry);
        }

        let results = self.index.search_with_cxs_normalized(mode, &probes)?;
        let tagged = results
            .into_iter()
            .zip(probes.iter())
            .zip(entries)
            .map(|(((context, raw), (_, normalized)), entry)| {
                let limited = limit_raw(raw, self.config.word_limit, self.config.doc_limit);
                (context, entry.boost(), vec![normalized.clone()], limited)
            })
            .collect();
        Ok(Intermediate::from_raw_contexts(tagged))
    }

    /// Evaluate a fuzzy probe: the term itself plus its fuzzy variants, each
    /// searched case-insensitively, merged best-first.
    fn eval_fuzzy(&self, contexts: &[String], term: &str, phrase: bool) -> Result<Intermediate> {
        let mut variants = vec![(term.to_string(), 0)];
        variants.extend(self.config.fuzzy.fuzz(term));
        debug!(variants = variants.len(), "fuzzy probe");

        let mut results = Vec::with_capacity(variants.len());
        for (i, (variant, _)) in variants.into_iter().enumerate() {
            self.cancel.check()?;
            let outcome = if phrase {
                self.eval(contexts, &Query::Phrase { case: MatchCase::NoCase, phrase: variant })
            } else {
                self.eval_word(contexts, SearchMode::PrefixNoCase, &variant)
            };
            match outcome {
                Ok(result) => results.push(result),
                // The user's own spelling must validate; generated variants
                // that fail a context validator just contribute nothing.
                Err(QuarryError::InvalidInput(_)) if i > 0 => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Intermediate::merges_doc_limited(self.config.doc_limit, results))
    }

    /// Match a multi-word phrase at adjacent positions, per context.
    fn eval_phrase(
        &self,
        contexts: &[String],
        mode: SearchMode,
        phrase: &str,
    ) -> Result<Intermediate> {
        let mut per_context = Vec::with_capacity(contexts.len());
        for context in contexts {
            self.cancel.check()?;
            let entry = self.entry(context)?;
            let analyzer = entry.analyzer.analyzer();
            let words: Vec<String> =
                phrase.split_whitespace().map(|w| analyzer.normalize(w)).collect();

            let Some(first) = words.first() else { continue };
            let mut survivors = self.exact_occurrences(context, mode, first)?;

            for (offset, word) in words.iter().enumerate().skip(1) {
                if survivors.is_empty() {
                    break;
                }
                let next = self.exact_occurrences(context, mode, word)?;
                survivors = survivors
                    .iter()
                    .filter_map(|(doc, positions)| {
                        let theirs = next.get(doc)?;
                        let viable =
                            positions.filter(|p| theirs.contains(p + offset as u32));
                        (!viable.is_empty()).then(|| (doc, viable))
                    })
                    .collect();
            }

            if !survivors.is_empty() {
                per_context.push(Intermediate::from_raw(
                    context,
                    entry.boost(),
                    vec![phrase.to_string()],
                    vec![(phrase.to_string(), survivors)],
                ));
            }
        }
        Ok(Intermediate::merges(per_context))
    }

    /// Inclusive range search across the active contexts.
    fn eval_range(&self, contexts: &[String], lo: &str, hi: &str) -> Result<Intermediate> {
        let mut tagged = Vec::with_capacity(contexts.len());
        for context in contexts {
            self.cancel.check()?;
            let entry = self.entry(context)?;
            let lo = self.normalize_and_validate(context, entry, lo)?;
            let hi = self.normalize_and_validate(context, entry, hi)?;
            let raw = self.index.lookup_range_cx(context, &lo, &hi)?;
            let limited = limit_raw(raw, self.config.word_limit, self.config.doc_limit);
            tagged.push((context.clone(), entry.boost(), vec![lo, hi], limited));
        }
        Ok(Intermediate::from_raw_contexts(tagged))
    }

    /// Exact lookup of one word, folding the postings of every matching key
    /// (several under `NoCase`) into one occurrence map.
    fn exact_occurrences(
        &self,
        context: &str,
        mode: SearchMode,
        word: &str,
    ) -> Result<Occurrences> {
        let raw = self.index.search_with_cx(mode, context, word)?;
        Ok(raw
            .into_iter()
            .fold(Occurrences::new(), |acc, (_, occ)| acc.union(&occ)))
    }

    fn entry(&self, context: &str) -> Result<&ContextSchema> {
        self.schema
            .get(context)
            .ok_or_else(|| QuarryError::not_found(format!("context '{context}'")))
    }

    fn normalize_and_validate(
        &self,
        context: &str,
        entry: &ContextSchema,
        term: &str,
    ) -> Result<String> {
        let normalized = entry.analyzer.analyzer().normalize(term);
        let ty = self.registry.get(&entry.cx_type).ok_or_else(|| {
            QuarryError::unknown_type(format!(
                "context '{context}' has unregistered type '{}'",
                entry.cx_type
            ))
        })?;
        if !(ty.validate)(&normalized) {
            return Err(QuarryError::invalid_input(format!(
                "term '{term}' is not valid for context '{context}'"
            )));
        }
        Ok(normalized)
    }
}

/// Apply the two raw-result knobs, document limit first.
///
/// The document limit walks the index-ordered list and keeps the prefix that
/// first reaches `doc_limit` documents, relying on the convention that
/// shorter, closer matches come first. The word limit then keeps the
/// `word_limit` words with the fewest documents — a rarer-first heuristic on
/// plain occurrence counts, deliberately not an IDF.
pub fn limit_raw(mut raw: RawResult, word_limit: usize, doc_limit: usize) -> RawResult {
    if doc_limit > 0 {
        let mut covered = 0;
        let mut cut = raw.len();
        for (i, (_, occurrences)) in raw.iter().enumerate() {
            covered += occurrences.doc_count();
            if covered >= doc_limit {
                cut = i + 1;
                break;
            }
        }
        raw.truncate(cut);
    }
    if word_limit > 0 && raw.len() > word_limit {
        raw.sort_by_key(|(_, occurrences)| occurrences.doc_count());
        raw.truncate(word_limit);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerKind;
    use crate::index::context::AnyIndex;
    use crate::index::posting::Positions;
    use crate::schema::ContextSchema;

    fn occ(entries: &[(u64, &[u32])]) -> Occurrences {
        entries
            .iter()
            .map(|(d, ps)| (*d, Positions::from_vec(ps.to_vec())))
            .collect()
    }

    struct Fixture {
        schema: Schema,
        registry: TypeRegistry,
        index: ContextIndex,
        config: ProcessConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut schema = Schema::new();
            schema.insert("subject", ContextSchema::new("text").with_weight(2.0));
            schema.insert("content", ContextSchema::new("text"));
            schema.insert(
                "publish_date",
                ContextSchema::new("date")
                    .with_analyzer(AnalyzerKind::Keyword)
                    .with_default(false),
            );

            let mut index = ContextIndex::new();
            index.insert_context("subject", AnyIndex::empty_text()).unwrap();
            index.insert_context("content", AnyIndex::empty_text()).unwrap();
            index.insert_context("publish_date", AnyIndex::empty_date()).unwrap();

            Fixture { schema, registry: TypeRegistry::default(), index, config: ProcessConfig::default() }
        }

        fn add(&mut self, context: &str, word: &str, postings: &[(u64, &[u32])]) {
            self.index
                .insert_list_cx(context, vec![(word.to_string(), occ(postings))])
                .unwrap();
        }

        fn run(&self, query: Query) -> Result<Intermediate> {
            let processor = QueryProcessor::new(
                &self.config,
                &self.schema,
                &self.registry,
                &self.index,
                CancelToken::new(),
            );
            processor.process(query)
        }
    }

    #[test]
    fn test_word_prefix_search_over_defaults() {
        let mut fx = Fixture::new();
        fx.add("content", "hello", &[(1, &[0])]);
        fx.add("content", "helmet", &[(2, &[0])]);
        fx.add("subject", "hello", &[(3, &[0])]);

        let result = fx.run(Query::word(MatchCase::NoCase, "hel")).unwrap();
        assert_eq!(result.doc_count(), 3);
        // Subject matches carry the context weight.
        assert_eq!(result.get(3).unwrap().boost, 2.0);
        assert_eq!(result.get(1).unwrap().boost, 1.0);
    }

    #[test]
    fn test_context_restriction_and_unknown_context() {
        let mut fx = Fixture::new();
        fx.add("subject", "cat", &[(1, &[0])]);
        fx.add("content", "dog", &[(1, &[0])]);

        let restricted = fx
            .run(Query::context(
                vec!["content".to_string()],
                Query::word(MatchCase::Case, "cat"),
            ))
            .unwrap();
        assert!(restricted.is_empty());

        let err = fx
            .run(Query::context(
                vec!["nope".to_string()],
                Query::word(MatchCase::Case, "cat"),
            ))
            .unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn test_binary_operators() {
        let mut fx = Fixture::new();
        fx.add("content", "x", &[(1, &[0]), (2, &[0])]);
        fx.add("content", "y", &[(2, &[1]), (3, &[0])]);

        let and = fx
            .run(Query::and(
                Query::word(MatchCase::Case, "x"),
                Query::word(MatchCase::Case, "y"),
            ))
            .unwrap();
        assert_eq!(and.doc_count(), 1);
        assert!(and.contains(2));

        let or = fx
            .run(Query::or(
                Query::word(MatchCase::Case, "x"),
                Query::word(MatchCase::Case, "y"),
            ))
            .unwrap();
        assert_eq!(or.doc_count(), 3);

        let and_not = fx
            .run(Query::and_not(
                Query::word(MatchCase::Case, "x"),
                Query::word(MatchCase::Case, "y"),
            ))
            .unwrap();
        assert_eq!(and_not.doc_count(), 1);
        assert!(and_not.contains(1));
    }

    #[test]
    fn test_phrase_positions() {
        let mut fx = Fixture::new();
        // "a b c a b"
        fx.add("content", "a", &[(1, &[0, 3])]);
        fx.add("content", "b", &[(1, &[1, 4])]);
        fx.add("content", "c", &[(1, &[2])]);

        let hit = |q: &str| fx.run(Query::phrase(MatchCase::Case, q)).unwrap();

        let ab = hit("a b");
        assert_eq!(
            ab.get(1).unwrap().contexts["content"]["a b"]
                .positions
                .iter()
                .collect::<Vec<_>>(),
            vec![0, 3]
        );

        let bc = hit("b c");
        assert_eq!(
            bc.get(1).unwrap().contexts["content"]["b c"]
                .positions
                .iter()
                .collect::<Vec<_>>(),
            vec![1]
        );

        assert!(hit("a c").is_empty());
        // Longer than the document.
        assert!(hit("a b c a b c").is_empty());
    }

    #[test]
    fn test_single_word_phrase_degenerates_to_word_search() {
        let mut fx = Fixture::new();
        fx.add("content", "hello", &[(1, &[0])]);

        let as_phrase = fx.run(Query::phrase(MatchCase::NoCase, "hel")).unwrap();
        let as_word = fx.run(Query::word(MatchCase::NoCase, "hel")).unwrap();
        assert_eq!(as_phrase, as_word);
        assert!(as_phrase.contains(1));

        assert!(fx.run(Query::phrase(MatchCase::Case, "")).unwrap().is_empty());
    }

    #[test]
    fn test_range_query_on_dates() {
        let mut fx = Fixture::new();
        fx.add("publish_date", "2014-01-15", &[(1, &[0])]);
        fx.add("publish_date", "2014-02-10", &[(2, &[0])]);
        fx.add("publish_date", "2014-03-01", &[(3, &[0])]);

        let result = fx
            .run(Query::context(
                vec!["publish_date".to_string()],
                Query::range("2014-01-01", "2014-01-31"),
            ))
            .unwrap();
        assert_eq!(result.doc_count(), 1);
        assert!(result.contains(1));

        // Inverted bounds yield nothing.
        let empty = fx
            .run(Query::context(
                vec!["publish_date".to_string()],
                Query::range("2014-03-01", "2014-01-01"),
            ))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_invalid_term_is_fatal() {
        let fx = Fixture::new();
        let err = fx
            .run(Query::context(
                vec!["publish_date".to_string()],
                Query::word(MatchCase::Case, "not-a-date"),
            ))
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_boost_composition() {
        let mut fx = Fixture::new();
        fx.add("subject", "cat", &[(1, &[0])]);

        let result = fx
            .run(Query::boost(
                2.0,
                Query::boost(3.0, Query::word(MatchCase::Case, "cat")),
            ))
            .unwrap();
        // 6.0 from the boosts times the context weight 2.0.
        assert_eq!(result.get(1).unwrap().boost, 12.0);

        let identity = fx.run(Query::boost(1.0, Query::word(MatchCase::Case, "cat"))).unwrap();
        assert_eq!(identity.get(1).unwrap().boost, 2.0);
    }

    #[test]
    fn test_fuzzy_includes_swapped_spelling() {
        let mut fx = Fixture::new();
        fx.add("content", "grid", &[(1, &[0])]);

        // "gird" is one adjacent swap away from "grid".
        let result = fx.run(Query::word(MatchCase::Fuzzy, "gird")).unwrap();
        assert!(result.contains(1));
    }

    #[test]
    fn test_empty_word_matches_nothing() {
        let fx = Fixture::new();
        let err = fx.run(Query::word(MatchCase::Case, ""));
        // The text validator rejects the empty term.
        assert_eq!(err.unwrap_err().code(), 400);
    }

    #[test]
    fn test_cancelled_token_aborts() {
        let mut fx = Fixture::new();
        fx.add("content", "x", &[(1, &[0])]);
        let token = CancelToken::new();
        token.cancel();
        let processor = QueryProcessor::new(
            &fx.config,
            &fx.schema,
            &fx.registry,
            &fx.index,
            token,
        );
        let err = processor.process(Query::word(MatchCase::Case, "x")).unwrap_err();
        assert!(matches!(err, QuarryError::Cancelled));
    }

    #[test]
    fn test_limit_raw() {
        let raw: RawResult = vec![
            ("a".to_string(), occ(&[(1, &[0]), (2, &[0])])),
            ("b".to_string(), occ(&[(3, &[0])])),
            ("c".to_string(), occ(&[(4, &[0])])),
        ];

        // Doc limit includes the crossing element.
        let limited = limit_raw(raw.clone(), 0, 3);
        assert_eq!(limited.len(), 2);

        // Word limit keeps the rarest words.
        let limited = limit_raw(raw.clone(), 2, 0);
        assert_eq!(limited.len(), 2);
        assert!(limited.iter().all(|(w, _)| w == "b" || w == "c"));

        // Zero disables both.
        assert_eq!(limit_raw(raw, 0, 0).len(), 3);
    }
}
