//! Environment-driven service configuration.
//!
//! All shared settings are read here instead of scattering `std::env::var`
//! calls across modules. `validate()` runs at startup and fails fast on
//! missing credentials unless the LM mock mode is enabled.

use crate::error::{Error, Result};

/// Environment variable names
pub mod env_vars {
    pub const GRAPH_URI: &str = "GRAPHMIND_GRAPH_URI";
    pub const GRAPH_USER: &str = "GRAPHMIND_GRAPH_USER";
    pub const GRAPH_PASSWORD: &str = "GRAPHMIND_GRAPH_PASSWORD";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
    pub const ONTOLOGY_HINTS_PATH: &str = "GRAPHMIND_ONTOLOGY_HINTS_PATH";
    pub const RULE_PROFILE_DIR: &str = "GRAPHMIND_RULE_PROFILE_DIR";
    pub const SEMANTIC_ARTIFACT_DIR: &str = "GRAPHMIND_SEMANTIC_ARTIFACT_DIR";
    pub const RELATEDNESS_THRESHOLD: &str = "GRAPHMIND_LINKING_RELATEDNESS_THRESHOLD";
    pub const ENABLE_RULE_CONSTRAINTS: &str = "GRAPHMIND_ENABLE_RULE_CONSTRAINTS";
    pub const MOCK_LANGUAGE_MODEL: &str = "GRAPHMIND_MOCK_LANGUAGE_MODEL";
}

/// Read an environment string, treating empty values as unset.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Read a boolean flag (`1`/`true`/`yes`/`on`, case-insensitive).
#[must_use]
pub fn env_bool(name: &str, default: bool) -> bool {
    env_string(name).map_or(default, |raw| {
        matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

/// Read a float, falling back to `default` on absence or parse failure.
#[must_use]
pub fn env_f64(name: &str, default: f64) -> f64 {
    env_string(name)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub ontology_hints_path: String,
    pub rule_profile_dir: String,
    pub semantic_artifact_dir: String,
    pub relatedness_threshold: f64,
    pub enable_rule_constraints: bool,
    pub mock_language_model: bool,
}

impl ServiceConfig {
    /// Load configuration from the environment with documented defaults.
    #[must_use]
    pub fn from_env() -> Self {
        use env_vars as ev;
        Self {
            graph_uri: env_string(ev::GRAPH_URI)
                .unwrap_or_else(|| "bolt://localhost:7687".to_string()),
            graph_user: env_string(ev::GRAPH_USER).unwrap_or_else(|| "neo4j".to_string()),
            graph_password: env_string(ev::GRAPH_PASSWORD).unwrap_or_default(),
            openai_api_key: env_string(ev::OPENAI_API_KEY).unwrap_or_default(),
            openai_model: env_string(ev::OPENAI_MODEL)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            ontology_hints_path: env_string(ev::ONTOLOGY_HINTS_PATH)
                .unwrap_or_else(|| "output/ontology_hints.json".to_string()),
            rule_profile_dir: env_string(ev::RULE_PROFILE_DIR)
                .unwrap_or_else(|| "output/rule_profiles".to_string()),
            semantic_artifact_dir: env_string(ev::SEMANTIC_ARTIFACT_DIR)
                .unwrap_or_else(|| "output/semantic_artifacts".to_string()),
            relatedness_threshold: env_f64(ev::RELATEDNESS_THRESHOLD, 0.2),
            enable_rule_constraints: env_bool(ev::ENABLE_RULE_CONSTRAINTS, true),
            mock_language_model: env_bool(ev::MOCK_LANGUAGE_MODEL, false),
        }
    }

    /// Validate critical settings at startup.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the LM API key is missing and mock
    /// mode is off.
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_empty() && !self.mock_language_model {
            return Err(Error::configuration(format!(
                "{} is required unless {} is enabled",
                env_vars::OPENAI_API_KEY,
                env_vars::MOCK_LANGUAGE_MODEL
            )));
        }
        if self.graph_uri == "bolt://localhost:7687" {
            tracing::warn!(
                uri = %self.graph_uri,
                "using default graph URI; set {} for production",
                env_vars::GRAPH_URI
            );
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env-var mutation across tests.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("GM_TEST_FLAG", "YES");
        assert!(env_bool("GM_TEST_FLAG", false));
        std::env::set_var("GM_TEST_FLAG", "0");
        assert!(!env_bool("GM_TEST_FLAG", true));
        std::env::remove_var("GM_TEST_FLAG");
        assert!(env_bool("GM_TEST_FLAG", true));
    }

    #[test]
    fn test_env_f64_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("GM_TEST_FLOAT", "0.35");
        assert!((env_f64("GM_TEST_FLOAT", 0.2) - 0.35).abs() < 1e-9);
        std::env::set_var("GM_TEST_FLOAT", "not a float");
        assert!((env_f64("GM_TEST_FLOAT", 0.2) - 0.2).abs() < 1e-9);
        std::env::remove_var("GM_TEST_FLOAT");
    }

    #[test]
    fn test_validate_requires_api_key_without_mock() {
        let config = ServiceConfig {
            graph_uri: "bolt://graph:7687".to_string(),
            graph_user: "neo4j".to_string(),
            graph_password: "secret".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            ontology_hints_path: String::new(),
            rule_profile_dir: String::new(),
            semantic_artifact_dir: String::new(),
            relatedness_threshold: 0.2,
            enable_rule_constraints: true,
            mock_language_model: false,
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(_))
        ));

        let mocked = ServiceConfig {
            mock_language_model: true,
            ..config
        };
        assert!(mocked.validate().is_ok());
    }
}
