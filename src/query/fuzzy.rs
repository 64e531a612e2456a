//! Fuzzy term enumeration.
//!
//! A fuzzy query does not probe the index with one term but with the set of
//! near-spellings of it. [`FuzzyConfig::fuzz`] enumerates variants
//! breadth-first: each round applies adjacent-character swaps and the
//! configured character replacements to every variant of the previous round,
//! tagging each result with its edit distance from the original.

use serde::{Deserialize, Serialize};

/// Controls how far and by which edits the fuzzy set is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyConfig {
    /// Maximum edit distance. Zero yields no variants beyond the original.
    pub max_distance: u32,
    /// Whether adjacent characters may be transposed.
    pub swap_adjacent: bool,
    /// Substring replacements to try, in both directions (`("f", "ph")`
    /// rewrites `f`→`ph` and `ph`→`f`).
    pub replacements: Vec<(String, String)>,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        FuzzyConfig { max_distance: 1, swap_adjacent: true, replacements: Vec::new() }
    }
}

impl FuzzyConfig {
    /// Enumerate near-spellings of `term` with their edit distances, in
    /// ascending distance order. The original term is not included.
    pub fn fuzz(&self, term: &str) -> Vec<(String, u32)> {
        let mut seen: Vec<String> = vec![term.to_string()];
        let mut out: Vec<(String, u32)> = Vec::new();
        let mut frontier: Vec<String> = vec![term.to_string()];

        for distance in 1..=self.max_distance {
            let mut next = Vec::new();
            for variant in &frontier {
                for candidate in self.edits(variant) {
                    if !seen.contains(&candidate) {
                        seen.push(candidate.clone());
                        out.push((candidate.clone(), distance));
                        next.push(candidate);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// All single edits of `term` under this configuration.
    fn edits(&self, term: &str) -> Vec<String> {
        let chars: Vec<char> = term.chars().collect();
        let mut out = Vec::new();

        if self.swap_adjacent {
            for i in 0..chars.len().saturating_sub(1) {
                let mut swapped = chars.clone();
                swapped.swap(i, i + 1);
                let candidate: String = swapped.into_iter().collect();
                if candidate != term {
                    out.push(candidate);
                }
            }
        }

        for (from, to) in &self.replacements {
            out.extend(replace_each(term, from, to));
            out.extend(replace_each(term, to, from));
        }

        out
    }
}

/// Every string obtained by replacing exactly one occurrence of `from` in
/// `term` with `to`.
fn replace_each(term: &str, from: &str, to: &str) -> Vec<String> {
    if from.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    while let Some(offset) = term[start..].find(from) {
        let at = start + offset;
        let mut candidate = String::with_capacity(term.len() + to.len());
        candidate.push_str(&term[..at]);
        candidate.push_str(to);
        candidate.push_str(&term[at + from.len()..]);
        out.push(candidate);
        start = at + from.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance_yields_nothing() {
        let config = FuzzyConfig { max_distance: 0, ..FuzzyConfig::default() };
        assert!(config.fuzz("word").is_empty());
    }

    #[test]
    fn test_adjacent_swaps() {
        let config = FuzzyConfig::default();
        let variants = config.fuzz("abc");
        let words: Vec<&str> = variants.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["bac", "acb"]);
        assert!(variants.iter().all(|(_, d)| *d == 1));
    }

    #[test]
    fn test_replacements_run_both_ways() {
        let config = FuzzyConfig {
            max_distance: 1,
            swap_adjacent: false,
            replacements: vec![("f".to_string(), "ph".to_string())],
        };
        let variants: Vec<String> = config.fuzz("graf").into_iter().map(|(w, _)| w).collect();
        assert!(variants.contains(&"graph".to_string()));

        let variants: Vec<String> = config.fuzz("graph").into_iter().map(|(w, _)| w).collect();
        assert!(variants.contains(&"graf".to_string()));
    }

    #[test]
    fn test_distance_two_builds_on_distance_one() {
        let config = FuzzyConfig { max_distance: 2, ..FuzzyConfig::default() };
        let variants = config.fuzz("abcd");
        assert!(variants.iter().any(|(_, d)| *d == 2));
        // The original never reappears as a variant.
        assert!(variants.iter().all(|(w, _)| w != "abcd"));
    }
}
