//! lore-core: Shared types, configuration, and error handling for Lore.
//!
//! This crate provides the foundational types used across all Lore components:
//! - Source documents and their ingestion lifecycle
//! - Per-document concept and relationship snapshots
//! - Canonical concepts and relationships derived from snapshots
//! - Layered configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use error::LoreError;
pub use types::{
    BloomLevel, CanonicalConcept, CanonicalRelationship, ConceptSnapshot, Dependency,
    DocumentStatus, ExtractedConcept, ExtractedRelationship, RelKey, RelKind, RelSnapshot,
    SourceDocument,
};
