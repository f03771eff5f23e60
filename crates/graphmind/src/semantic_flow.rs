//! The deterministic semantic query flow.
//!
//! Four stages in a fixed order: entity resolution, route selection,
//! specialist execution (LPG and/or RDF), answer synthesis. Each stage emits
//! one trace step so the UI can show the pipeline.

use crate::connector::GraphConnector;
use crate::hints::OntologyHintStore;
use crate::resolver::{
    apply_entity_overrides, EntityOverride, SemanticContext, SemanticEntityResolver,
};
use crate::router::{QueryRouter, RouteMode};
use crate::specialists::{LpgSpecialist, RdfSpecialist, SpecialistResult};
use crate::synthesizer::AnswerSynthesizer;
use crate::trace::{StepType, TraceStep};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Full result of a semantic-flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticFlowOutcome {
    pub response: String,
    pub trace_steps: Vec<TraceStep>,
    pub route: RouteMode,
    pub semantic_context: SemanticContext,
    pub lpg_result: Option<SpecialistResult>,
    pub rdf_result: Option<SpecialistResult>,
}

/// Resolver → router → specialists → synthesizer pipeline
pub struct SemanticQueryFlow {
    resolver: SemanticEntityResolver,
    router: QueryRouter,
    lpg_specialist: LpgSpecialist,
    rdf_specialist: RdfSpecialist,
    synthesizer: AnswerSynthesizer,
}

impl SemanticQueryFlow {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>, hint_store: Arc<OntologyHintStore>) -> Self {
        Self {
            resolver: SemanticEntityResolver::new(Arc::clone(&connector), hint_store),
            router: QueryRouter::new(),
            lpg_specialist: LpgSpecialist::new(Arc::clone(&connector)),
            rdf_specialist: RdfSpecialist::new(connector),
            synthesizer: AnswerSynthesizer::new(),
        }
    }

    /// Run the four-stage pipeline.
    pub async fn run(
        &self,
        question: &str,
        databases: &[String],
        entity_overrides: &[EntityOverride],
    ) -> SemanticFlowOutcome {
        let mut trace_steps = Vec::new();

        let mut semantic_context = self.resolver.resolve(question, databases).await;
        apply_entity_overrides(&mut semantic_context, entity_overrides);
        trace_steps.push(
            TraceStep::new(
                "0",
                StepType::Semantic,
                "SemanticLayer",
                "Entity extraction and disambiguation completed.",
            )
            .with_metadata(json!({
                "entities": semantic_context.entities,
                "unresolved_entities": semantic_context.unresolved_entities,
                "overrides_applied": semantic_context
                    .overrides_applied
                    .keys()
                    .collect::<Vec<_>>(),
            })),
        );

        let route = self.router.route(question);
        trace_steps.push(
            TraceStep::new(
                "1",
                StepType::Router,
                "RouterAgent",
                format!("Question routed to {}.", route.as_str()),
            )
            .with_metadata(json!({ "route": route })),
        );

        let mut lpg_result = None;
        if route.includes_lpg() {
            let result = self.lpg_specialist.run(databases, &semantic_context).await;
            trace_steps.push(
                TraceStep::new("2", StepType::Specialist, "LpgSpecialist", &result.summary)
                    .with_metadata(json!({ "records": result.record_count() })),
            );
            lpg_result = Some(result);
        }

        let mut rdf_result = None;
        if route.includes_rdf() {
            let result = self.rdf_specialist.run(databases, &semantic_context).await;
            trace_steps.push(
                TraceStep::new("3", StepType::Specialist, "RdfSpecialist", &result.summary)
                    .with_metadata(json!({ "records": result.record_count() })),
            );
            rdf_result = Some(result);
        }

        let response = self.synthesizer.synthesize(
            route,
            &semantic_context,
            lpg_result.as_ref(),
            rdf_result.as_ref(),
        );
        trace_steps.push(TraceStep::new(
            "4",
            StepType::Generation,
            "AnswerSynthesizer",
            &response,
        ));

        SemanticFlowOutcome {
            response,
            trace_steps,
            route,
            semantic_context,
            lpg_result,
            rdf_result,
        }
    }
}
