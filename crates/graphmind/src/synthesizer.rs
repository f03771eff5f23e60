//! Deterministic answer composition for the semantic path.
//!
//! No language-model call here: the response is assembled from the route, the
//! resolution outcome, and specialist record counts, which keeps the semantic
//! path fully deterministic under test.

use crate::resolver::SemanticContext;
use crate::router::RouteMode;
use crate::specialists::SpecialistResult;

/// Compose the final semantic-path response
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerSynthesizer;

impl AnswerSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn synthesize(
        &self,
        route: RouteMode,
        semantic_context: &SemanticContext,
        lpg_result: Option<&SpecialistResult>,
        rdf_result: Option<&SpecialistResult>,
    ) -> String {
        let mut lines = vec![format!(
            "Route selected: {}.",
            route.as_str().to_uppercase()
        )];

        if !semantic_context.entities.is_empty() {
            lines.push(format!(
                "Extracted entities: {}.",
                semantic_context.entities.join(", ")
            ));
        }
        if !semantic_context.unresolved_entities.is_empty() {
            lines.push(format!(
                "Unresolved entities: {}.",
                semantic_context.unresolved_entities.join(", ")
            ));
        }

        let lpg_records = lpg_result.map_or(0, SpecialistResult::record_count);
        let rdf_records = rdf_result.map_or(0, SpecialistResult::record_count);
        if lpg_records > 0 {
            lines.push(format!("LPG records: {lpg_records}."));
        }
        if rdf_records > 0 {
            lines.push(format!("RDF records: {rdf_records}."));
        }
        if lpg_records == 0 && rdf_records == 0 {
            lines.push("No matching graph records were found for this question.".to_string());
        }

        lines.join(" ")
    }
}
