//! lore-ingest: Provenance-preserving ingestion for the Lore knowledge graph.
//!
//! Ties the checksum registry, the structural validator and the graph
//! writer together. [`ProvenanceManager`] owns document lifecycle and the
//! delta rebuild of canonical entities; [`IngestPipeline`] runs one
//! document end to end; [`RecoverySweep`] cleans up after abandoned runs.

pub mod config;
pub mod error;
pub mod locks;
pub mod merge;
pub mod pipeline;
pub mod provenance;
pub mod recovery;

pub use error::{IngestError, Result};
pub use locks::{FilenameGuard, FilenameLocks};
pub use pipeline::{IngestOutcome, IngestPipeline, IngestRequest};
pub use provenance::{
    OverwriteResult, OverwriteStatus, ProvenanceManager, RebuildSummary, RemovalResult,
    SnapshotCounts,
};
pub use recovery::{RecoverySweep, SweepReport};
