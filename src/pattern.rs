//! Shared name matching for class, selector, and protocol finders.
//!
//! Three modes: exact (case-sensitive equality, used by strict single-name
//! lookups), substring (case-insensitive containment, used when a fuzzy
//! finder gets a plain pattern), and wildcard (`*`/`?` translated into an
//! anchored case-insensitive regex).

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Substring,
    Wildcard,
}

#[derive(Debug, Clone)]
enum Compiled {
    Exact,
    Substring,
    Regex(regex::Regex),
}

/// A pattern compiled once and applied across a whole filter pass.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    compiled: Compiled,
}

impl Pattern {
    /// Fuzzy-finder contract: plain patterns match as substrings, wildcard
    /// patterns as anchored regexes, and an uncompilable wildcard degrades to
    /// substring matching.
    pub fn fuzzy(raw: &str) -> Self {
        Self::build(raw, Compiled::Substring)
    }

    /// Strict-finder contract: plain patterns must match exactly, and an
    /// uncompilable wildcard degrades to exact matching.
    pub fn strict(raw: &str) -> Self {
        Self::build(raw, Compiled::Exact)
    }

    fn build(raw: &str, plain: Compiled) -> Self {
        let compiled = if has_wildcards(raw) {
            match compile_wildcard(raw) {
                Some(re) => Compiled::Regex(re),
                None => {
                    tracing::warn!("Wildcard pattern '{raw}' failed to compile, degrading");
                    plain
                }
            }
        } else {
            plain
        };
        Self {
            raw: raw.to_string(),
            compiled,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the raw pattern contains `*` or `?`.
    pub fn is_wildcard(&self) -> bool {
        has_wildcards(&self.raw)
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.compiled {
            Compiled::Exact => name == self.raw,
            Compiled::Substring => name.to_lowercase().contains(&self.raw.to_lowercase()),
            Compiled::Regex(re) => re.is_match(name),
        }
    }
}

pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

fn compile_wildcard(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
        .ok()
}

/// One-shot match in an explicit mode. Wildcard compile failures degrade to
/// substring here, matching the fuzzy-finder contract.
pub fn matches(name: &str, pattern: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Exact => name == pattern,
        MatchMode::Substring => name.to_lowercase().contains(&pattern.to_lowercase()),
        MatchMode::Wildcard => match compile_wildcard(pattern) {
            Some(re) => re.is_match(name),
            None => name.to_lowercase().contains(&pattern.to_lowercase()),
        },
    }
}
