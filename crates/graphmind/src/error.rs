//! Error types for GraphMind.
//!
//! Every error carries a *kind* with concrete operational semantics: only
//! infrastructure errors are retry-eligible, and each kind maps to a fixed
//! HTTP status for the server surface.

use thiserror::Error;

/// Error type for all GraphMind operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed configuration (fatal at boot, 400 at request time)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input data failed validation (bad label, bad workspace id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Role is not allowed to perform the requested action
    #[error("Permission denied: {0}")]
    Permission(String),

    /// A pipeline item failed (extraction parse, load data issue)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Transient infrastructure failure (graph store, LM provider)
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// Raw material could not be parsed (unsupported or malformed input)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error is retry-eligible.
    ///
    /// Strictly kind-based: only infrastructure errors retry. Validation and
    /// parse errors must never be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// Stable error code carried in HTTP error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Validation(_) => "ValidationError",
            Self::Permission(_) => "PermissionError",
            Self::Pipeline(_) => "PipelineError",
            Self::Infrastructure(_) => "InfrastructureError",
            Self::Parse(_) => "ParseError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// HTTP status code for the server error mapping.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Configuration(_) => 400,
            Self::Validation(_) | Self::Pipeline(_) | Self::Parse(_) => 422,
            Self::Permission(_) => 403,
            Self::Infrastructure(_) => 502,
            Self::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("JSON error: {err}"))
    }
}

/// Result type alias for GraphMind operations
pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = Error::configuration("OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("bad label");
        assert_eq!(err.to_string(), "Validation error: bad label");
    }

    #[test]
    fn test_only_infrastructure_is_transient() {
        assert!(Error::infrastructure("connection reset").is_transient());
        assert!(!Error::configuration("x").is_transient());
        assert!(!Error::validation("x").is_transient());
        assert!(!Error::permission("x").is_transient());
        assert!(!Error::pipeline("x").is_transient());
        assert!(!Error::parse("x").is_transient());
        assert!(!Error::internal("x").is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::configuration("x").error_code(), "ConfigurationError");
        assert_eq!(Error::validation("x").error_code(), "ValidationError");
        assert_eq!(Error::permission("x").error_code(), "PermissionError");
        assert_eq!(Error::pipeline("x").error_code(), "PipelineError");
        assert_eq!(
            Error::infrastructure("x").error_code(),
            "InfrastructureError"
        );
        assert_eq!(Error::parse("x").error_code(), "ParseError");
        assert_eq!(Error::internal("x").error_code(), "InternalError");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::configuration("x").http_status(), 400);
        assert_eq!(Error::validation("x").http_status(), 422);
        assert_eq!(Error::pipeline("x").http_status(), 422);
        assert_eq!(Error::parse("x").http_status(), 422);
        assert_eq!(Error::permission("x").http_status(), 403);
        assert_eq!(Error::infrastructure("x").http_status(), 502);
        assert_eq!(Error::internal("x").http_status(), 500);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("{bad").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.http_status(), 422);
    }
}
