//! Ontology hints: alias resolution and label keywords.
//!
//! A JSON-file-backed store of `{aliases: {normalized key -> canonical},
//! label_keywords: {canonical key -> [tokens]}}` used by the entity resolver
//! to rewrite question entities and bias candidate ranking. Missing or
//! malformed files degrade to an empty store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^a-z0-9]+").expect("normalization regex is valid")
});

/// Lowercase and strip punctuation, collapsing runs into single spaces.
#[must_use]
pub fn normalize_text(value: &str) -> String {
    NON_ALNUM_RE
        .replace_all(&value.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Keyword tokens (length >= 2) of a normalized string.
#[must_use]
pub fn keyword_tokens(value: &str) -> BTreeSet<String> {
    normalize_text(value)
        .split(' ')
        .filter(|token| token.len() >= 2)
        .map(ToString::to_string)
        .collect()
}

/// Serialized hints file shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyHints {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub label_keywords: BTreeMap<String, Vec<String>>,
}

/// Alias/keyword store consulted during entity resolution
#[derive(Debug, Clone, Default)]
pub struct OntologyHintStore {
    hints: OntologyHints,
}

impl OntologyHintStore {
    #[must_use]
    pub fn new(hints: OntologyHints) -> Self {
        Self { hints }
    }

    /// Load from a JSON file; unreadable or malformed files yield an empty store.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let hints = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        if path.exists() {
            tracing::debug!(path = %path.display(), "loaded ontology hints");
        }
        Self { hints }
    }

    /// Rewrite an entity through the alias map; unknown aliases pass through.
    #[must_use]
    pub fn resolve_alias(&self, entity: &str) -> String {
        let key = normalize_text(entity);
        self.hints
            .aliases
            .get(&key)
            .cloned()
            .unwrap_or_else(|| entity.to_string())
    }

    /// Canonical keys whose keyword tokens appear in the question.
    #[must_use]
    pub fn infer_label_hints(&self, question: &str) -> BTreeSet<String> {
        let question_tokens = keyword_tokens(question);
        let mut hints = BTreeSet::new();
        for (canonical_key, keywords) in &self.hints.label_keywords {
            if keywords.iter().any(|kw| question_tokens.contains(kw)) {
                hints.insert(canonical_key.clone());
            }
        }
        hints
    }

    /// Compact summary for trace metadata.
    #[must_use]
    pub fn to_summary(&self) -> Value {
        json!({
            "alias_count": self.hints.aliases.len(),
            "label_keyword_count": self.hints.label_keywords.len(),
        })
    }
}

/// Hint-source record: a canonical name with its aliases and keywords
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintRecord {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Build the hints payload from canonical/alias/keyword records.
#[must_use]
pub fn build_hints_from_records(records: &[HintRecord]) -> OntologyHints {
    let mut aliases: BTreeMap<String, String> = BTreeMap::new();
    let mut label_keywords: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for record in records {
        let canonical = record.canonical.trim();
        if canonical.is_empty() {
            continue;
        }
        let canonical_key = normalize_text(canonical);

        let mut alias_values: BTreeSet<&str> = record
            .aliases
            .iter()
            .map(String::as_str)
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .collect();
        alias_values.insert(canonical);

        for alias in alias_values {
            let alias_key = normalize_text(alias);
            if !alias_key.is_empty() {
                aliases.insert(alias_key, canonical.to_string());
            }
        }

        let keywords = label_keywords.entry(canonical_key).or_default();
        for raw in &record.keywords {
            keywords.extend(keyword_tokens(raw));
        }
        keywords.extend(keyword_tokens(canonical));
    }

    OntologyHints {
        aliases,
        label_keywords: label_keywords
            .into_iter()
            .filter(|(_, tokens)| !tokens.is_empty())
            .map(|(key, tokens)| (key, tokens.into_iter().collect()))
            .collect(),
    }
}
