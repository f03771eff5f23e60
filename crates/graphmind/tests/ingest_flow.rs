//! Runtime ingestion end to end: fallback extraction, per-database isolation,
//! and rule-inference round-trip.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use graphmind::connector::{GraphConnector, GraphStoreAdmin};
use graphmind::dedup::EntityDeduplicator;
use graphmind::graph::{GraphPayload, Node};
use graphmind::hints::OntologyHintStore;
use graphmind::ingest::{IngestOptions, IngestStatus, RuntimeIngestor};
use graphmind::parser::RawRecord;
use graphmind::rules::{apply_rules_to_graph, infer_rules_from_graph, InferenceOptions, RuleKind};
use graphmind::semantic_flow::SemanticQueryFlow;
use graphmind::DatabaseRegistry;
use graphmind_testing::InMemoryGraphStore;
use serde_json::{json, Value};
use std::sync::Arc;

fn entity_count(lpg_records: &[Value], database: &str) -> u64 {
    lpg_records
        .iter()
        .filter(|record| record["database"] == database && record["label"] == "Entity")
        .filter_map(|record| record["count"].as_u64())
        .sum()
}

#[tokio::test]
async fn ingest_isolates_databases_and_feeds_semantic_queries() {
    let registry = Arc::new(DatabaseRegistry::new());
    let store = Arc::new(InMemoryGraphStore::new(Arc::clone(&registry)));
    let ingestor = RuntimeIngestor::without_language_models(
        Arc::clone(&store) as Arc<dyn GraphConnector>,
        Arc::clone(&store) as Arc<dyn GraphStoreAdmin>,
    );

    // Two records into kgruntimec, one into kgruntimeb.
    let summary_c = ingestor
        .ingest_records(
            &[
                RawRecord::text("Acme acquired Globex and Initech."),
                RawRecord::text("Umbrella partners with Stark and Wayne."),
            ],
            "kgruntimec",
            &IngestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(summary_c.status, IngestStatus::SuccessWithFallback);
    assert_eq!(summary_c.records_processed, 2);

    let summary_b = ingestor
        .ingest_records(
            &[RawRecord::text("Acme exists.")],
            "kgruntimeb",
            &IngestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(summary_b.records_processed, 1);

    // The same overview question against each database sees only that
    // database's entities.
    let flow = SemanticQueryFlow::new(
        Arc::clone(&store) as Arc<dyn GraphConnector>,
        Arc::new(OntologyHintStore::default()),
    );
    let outcome_c = flow
        .run("zzqzz graph overview", &["kgruntimec".to_string()], &[])
        .await;
    let outcome_b = flow
        .run("zzqzz graph overview", &["kgruntimeb".to_string()], &[])
        .await;

    let records_c = outcome_c.lpg_result.unwrap().records;
    let records_b = outcome_b.lpg_result.unwrap().records;
    let count_c = entity_count(&records_c, "kgruntimec");
    let count_b = entity_count(&records_b, "kgruntimeb");
    assert!(
        count_c > count_b,
        "expected kgruntimec ({count_c}) to hold more entities than kgruntimeb ({count_b})"
    );
    assert!(count_b >= 1);
}

#[tokio::test]
async fn ingested_graphs_carry_rule_annotations() {
    let registry = Arc::new(DatabaseRegistry::new());
    let store = Arc::new(InMemoryGraphStore::new(Arc::clone(&registry)));
    let ingestor = RuntimeIngestor::without_language_models(
        Arc::clone(&store) as Arc<dyn GraphConnector>,
        Arc::clone(&store) as Arc<dyn GraphStoreAdmin>,
    );

    let summary = ingestor
        .ingest_records(
            &[RawRecord::text("Acme and Globex trade with Initech.")],
            "kgruntimea",
            &IngestOptions::default(),
        )
        .await
        .unwrap();

    let profile = summary.rule_profile.unwrap();
    // The fallback extractor always fills Entity.name.
    assert!(profile
        .rules
        .iter()
        .any(|rule| rule.label == "Entity"
            && rule.property == "name"
            && rule.kind == RuleKind::Required));
}

#[tokio::test]
async fn deduplicator_assigns_canonical_ids_across_records() {
    let registry = Arc::new(DatabaseRegistry::new());
    let store = Arc::new(InMemoryGraphStore::new(Arc::clone(&registry)));
    let deduplicator = Arc::new(EntityDeduplicator::new(Arc::new(
        graphmind_testing::MockEmbeddings::new(),
    )));
    let ingestor = RuntimeIngestor::without_language_models(
        Arc::clone(&store) as Arc<dyn GraphConnector>,
        Arc::clone(&store) as Arc<dyn GraphStoreAdmin>,
    )
    .with_deduplicator(deduplicator);

    // "Acme" appears in both records; the second occurrence reuses the
    // canonical id registered by the first.
    let first = RawRecord {
        id: Some("r1".to_string()),
        ..RawRecord::text("Acme leads.")
    };
    let second = RawRecord {
        id: Some("r2".to_string()),
        ..RawRecord::text("Acme follows Borland.")
    };
    ingestor
        .ingest_records(&[first], "kgruntimed", &IngestOptions::default())
        .await
        .unwrap();
    ingestor
        .ingest_records(&[second], "kgruntimed", &IngestOptions::default())
        .await
        .unwrap();

    // Every stored Acme row carries the first record's canonical id.
    let rows = store
        .run(
            "MATCH (n) WHERE any(key IN $properties WHERE n[key] IS NOT NULL \
             AND toLower(toString(n[key])) CONTAINS toLower($query)) \
             RETURN elementId(n) AS node_id, labels(n) AS labels, \
             coalesce(n.name, n.title, n.id, n.uri, elementId(n)) AS display_name LIMIT $limit",
            "kgruntimed",
            Some(json!({"properties": ["name"], "query": "Acme", "limit": 10})),
        )
        .await
        .unwrap();
    let entity_rows: Vec<_> = rows
        .iter()
        .filter(|row| row["labels"] == json!(["Entity"]))
        .collect();
    assert!(!entity_rows.is_empty());
    assert!(entity_rows
        .iter()
        .all(|row| row["node_id"] == json!("r1_ent_0")));
}

#[test]
fn rule_inference_round_trip() {
    // Reference graph: three Company nodes with name and employees.
    let reference = GraphPayload::new(
        vec![
            Node::new("c1", "Company")
                .with_property("name", json!("Acme"))
                .with_property("employees", json!(120)),
            Node::new("c2", "Company")
                .with_property("name", json!("Globex"))
                .with_property("employees", json!(900)),
            Node::new("c3", "Company")
                .with_property("name", json!("Initech"))
                .with_property("employees", json!(45)),
        ],
        vec![],
    );
    let profile = infer_rules_from_graph(&reference, &InferenceOptions::default());

    let has = |property: &str, kind: RuleKind| {
        profile
            .rules
            .iter()
            .any(|rule| rule.label == "Company" && rule.property == property && rule.kind == kind)
    };
    assert!(has("name", RuleKind::Required));
    assert!(has("name", RuleKind::Datatype));
    assert!(has("employees", RuleKind::Range));

    // The reference graph itself validates cleanly.
    let clean = apply_rules_to_graph(&reference, &profile);
    assert_eq!(clean.summary.failed_nodes, 0);

    // A candidate with an empty name and non-numeric employees fails with at
    // least two violations on the single bad node.
    let candidate = GraphPayload::new(
        vec![Node::new("bad", "Company")
            .with_property("name", json!(""))
            .with_property("employees", json!("many"))],
        vec![],
    );
    let validated = apply_rules_to_graph(&candidate, &profile);
    assert_eq!(validated.summary.failed_nodes, 1);
    let violations = validated.graph.nodes[0].properties["rule_validation"]["violations"]
        .as_array()
        .unwrap()
        .len();
    assert!(violations >= 2, "expected >= 2 violations, got {violations}");
}
