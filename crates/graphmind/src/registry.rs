//! Runtime-extensible database name registry.
//!
//! Central allowlist of graph database names. Every database named anywhere at
//! runtime must be registered here; the connector refuses unregistered names
//! without contacting the backend. The registry is process-wide and
//! append-only.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeSet;

static DB_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("database name regex is valid")
});

/// Databases seeded at startup.
const SEED_DATABASES: [&str; 5] = ["neo4j", "system", "kgnormal", "kgfibo", "agenttraces"];

/// Internal databases excluded from user-facing listings.
const INTERNAL_DATABASES: [&str; 3] = ["neo4j", "system", "agenttraces"];

/// Whether `name` is a syntactically valid database name.
#[must_use]
pub fn is_valid_database_name(name: &str) -> bool {
    DB_NAME_RE.is_match(name)
}

/// Validated, runtime-extensible set of database names
#[derive(Debug)]
pub struct DatabaseRegistry {
    databases: RwLock<BTreeSet<String>>,
}

impl DatabaseRegistry {
    /// Registry seeded with the default database set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(SEED_DATABASES.iter().map(ToString::to_string).collect()),
        }
    }

    /// Empty registry (tests and bespoke deployments).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            databases: RwLock::new(BTreeSet::new()),
        }
    }

    /// Register a database name after validation. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name does not match
    /// `^[A-Za-z][A-Za-z0-9]*$`.
    pub fn register(&self, name: &str) -> Result<()> {
        if !is_valid_database_name(name) {
            return Err(Error::validation(format!(
                "Invalid database name '{name}': must be alphanumeric and start with a letter"
            )));
        }
        self.databases.write().insert(name.to_string());
        Ok(())
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.databases.read().contains(name)
    }

    /// Sorted user-facing databases, excluding the internal set.
    #[must_use]
    pub fn list_user_databases(&self) -> Vec<String> {
        self.databases
            .read()
            .iter()
            .filter(|name| !INTERNAL_DATABASES.contains(&name.as_str()))
            .cloned()
            .collect()
    }

    /// Total registered names (internal databases included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.read().is_empty()
    }
}

impl Default for DatabaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}
