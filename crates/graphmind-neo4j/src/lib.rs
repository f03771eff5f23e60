//! # GraphMind Neo4j Integration
//!
//! [`GraphConnector`](graphmind::connector::GraphConnector) and
//! [`GraphStoreAdmin`](graphmind::connector::GraphStoreAdmin) implementations
//! over the bolt protocol via `neo4rs`, compatible with Neo4j and DozerDB.
//!
//! The connector validates every database name against the shared registry
//! before opening a session, converts JSON parameters to bolt values, and
//! wraps transient driver failures in the graph-store retry policy. The admin
//! provisions databases through the `system` database, loads graph payloads
//! with `MERGE` statements over validated labels, and summarizes schemas from
//! the `db.labels()` / `db.relationshipTypes()` / `db.propertyKeys()`
//! procedures.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphmind::registry::DatabaseRegistry;
//! use graphmind_neo4j::Neo4jConnector;
//! use std::sync::Arc;
//!
//! # async fn example() -> graphmind::Result<()> {
//! let registry = Arc::new(DatabaseRegistry::new());
//! let connector = Neo4jConnector::connect(
//!     "bolt://localhost:7687",
//!     "neo4j",
//!     "password",
//!     registry,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

mod admin;
mod connector;

pub use admin::Neo4jAdmin;
pub use connector::Neo4jConnector;
