//! Keyword-based query routing.
//!
//! Classifies a question as LPG, RDF, or hybrid from two fixed hint
//! vocabularies. Both vocabularies matched means hybrid; RDF hints alone mean
//! RDF; everything else defaults to LPG.

use serde::{Deserialize, Serialize};

const RDF_HINTS: [&str; 10] = [
    "rdf", "rdfs", "owl", "shacl", "sparql", "triple", "ontology", "uri", "class", "instance",
];

const LPG_HINTS: [&str; 8] = [
    "cypher",
    "node",
    "edge",
    "path",
    "neighbor",
    "graph",
    "community",
    "relationship",
];

/// Query route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Lpg,
    Rdf,
    Hybrid,
}

impl RouteMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lpg => "lpg",
            Self::Rdf => "rdf",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether the LPG specialist runs for this route.
    #[must_use]
    pub fn includes_lpg(&self) -> bool {
        matches!(self, Self::Lpg | Self::Hybrid)
    }

    /// Whether the RDF specialist runs for this route.
    #[must_use]
    pub fn includes_rdf(&self) -> bool {
        matches!(self, Self::Rdf | Self::Hybrid)
    }
}

/// Route a question to LPG, RDF, or the hybrid path
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryRouter;

impl QueryRouter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn route(&self, question: &str) -> RouteMode {
        let lowered = question.to_lowercase();
        let has_rdf = RDF_HINTS.iter().any(|hint| lowered.contains(hint));
        let has_lpg = LPG_HINTS.iter().any(|hint| lowered.contains(hint));
        match (has_rdf, has_lpg) {
            (true, true) => RouteMode::Hybrid,
            (true, false) => RouteMode::Rdf,
            _ => RouteMode::Lpg,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_route_is_lpg() {
        assert_eq!(QueryRouter::new().route("Who founded Acme?"), RouteMode::Lpg);
    }

    #[test]
    fn test_rdf_hints() {
        let router = QueryRouter::new();
        assert_eq!(router.route("Show the SPARQL triples"), RouteMode::Rdf);
        assert_eq!(router.route("which OWL ontology applies"), RouteMode::Rdf);
    }

    #[test]
    fn test_lpg_hints() {
        let router = QueryRouter::new();
        assert_eq!(router.route("expand the node neighbors"), RouteMode::Lpg);
        assert_eq!(router.route("shortest path in the graph"), RouteMode::Lpg);
    }

    #[test]
    fn test_hybrid_when_both_match() {
        let route = QueryRouter::new().route("map ontology classes onto graph neighbors");
        assert_eq!(route, RouteMode::Hybrid);
        assert!(route.includes_lpg());
        assert!(route.includes_rdf());
    }

    #[test]
    fn test_route_serialization() {
        assert_eq!(serde_json::to_string(&RouteMode::Lpg).unwrap(), r#""lpg""#);
        assert_eq!(
            serde_json::to_string(&RouteMode::Hybrid).unwrap(),
            r#""hybrid""#
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(QueryRouter::new().route("RDF RESOURCES"), RouteMode::Rdf);
    }
}
