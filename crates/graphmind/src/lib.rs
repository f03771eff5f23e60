//! # GraphMind Core
//!
//! Multi-database knowledge-graph question answering: a parallel debate
//! orchestrator over per-database specialist workers, a deterministic semantic
//! query flow, and a runtime ingestion pipeline with rule inference.
//!
//! ## Query paths
//!
//! - **Debate**: fan the question out to one worker per registered database,
//!   collect every result (successful or error-typed), and synthesize a final
//!   answer with a supervisor model. See [`debate::DebateOrchestrator`].
//! - **Semantic**: resolve question entities against the graph, route to the
//!   LPG and/or RDF specialist, and compose a deterministic answer. See
//!   [`semantic_flow::SemanticQueryFlow`].
//!
//! ## Ingest path
//!
//! [`ingest::RuntimeIngestor`] parses raw text/CSV/PDF records, extracts a
//! graph through three LM passes (ontology → SHACL → entities) with a
//! deterministic fallback, deduplicates entities by embedding similarity,
//! infers a rule profile for the batch, and loads the annotated graphs.
//!
//! ## Integration seams
//!
//! The graph store is reached through [`connector::GraphConnector`] and
//! [`connector::GraphStoreAdmin`]; language models through
//! [`language_models::JsonChatModel`] and [`language_models::Embeddings`].
//! Concrete implementations live in the `graphmind-neo4j` and
//! `graphmind-openai` crates; test doubles in `graphmind-testing`.

pub mod config;
pub mod connector;
pub mod debate;
pub mod dedup;
pub mod error;
pub mod factory;
pub mod fulltext;
pub mod graph;
pub mod hints;
pub mod ingest;
pub mod language_models;
pub mod memory;
pub mod parser;
pub mod passes;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod router;
pub mod rule_export;
pub mod rules;
pub mod semantic_flow;
pub mod session;
pub mod specialists;
pub mod stores;
pub mod synthesizer;
pub mod trace;
pub mod worker;

pub use error::{Error, Result};
pub use graph::{GraphPayload, Node, Relationship};
pub use memory::SharedMemory;
pub use registry::DatabaseRegistry;
pub use trace::{StepType, TraceStep};
