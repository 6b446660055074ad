//! lore-graph: Neo4j client and batch writer for the knowledge graph.
//!
//! This crate is the single mutation point for the knowledge graph. The
//! [`GraphStore`] trait describes every read and write the ingestion layer
//! needs; [`GraphClient`] implements it against Neo4j and
//! [`MemoryGraphStore`] implements it in process for tests and dry runs.
//! [`BatchWriter`] partitions large writes into bounded groups.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod statements;
pub mod store;
pub mod writer;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraphStore;
pub use store::{GraphStore, ProvenanceCleanup, RankedSnapshot};
pub use writer::{BatchWriter, WriteSummary, DEFAULT_BATCH_SIZE};
