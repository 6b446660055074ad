//! Error types for the lore-ingest crate.

use thiserror::Error;
use uuid::Uuid;

use lore_validate::ValidationResult;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The batch was rejected before any write. The full verdict is
    /// carried so callers can surface it verbatim.
    #[error("Batch rejected by validation ({} errors)", .0.error_count)]
    Validation(ValidationResult),

    /// A graph write failed mid-ingestion. The document stays PROCESSING
    /// until it is retried or swept.
    #[error("Store failure [correlation_id={correlation_id}]: {source}")]
    Store {
        correlation_id: Uuid,
        #[source]
        source: lore_graph::GraphError,
    },

    #[error("Graph error: {0}")]
    Graph(#[from] lore_graph::GraphError),

    #[error("Registry error: {0}")]
    Registry(#[from] lore_registry::RegistryError),

    #[error("Config error: {0}")]
    Config(#[from] lore_core::LoreError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
