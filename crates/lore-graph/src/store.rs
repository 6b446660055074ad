//! The storage seam between ingestion logic and the graph backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lore_core::{
    CanonicalConcept, CanonicalRelationship, ConceptSnapshot, DocumentStatus, RelKey, RelKind,
    RelSnapshot, SourceDocument,
};

use crate::client::GraphError;

/// A snapshot from a COMMITTED document, tagged with the document's upload
/// time for tie-breaking during rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSnapshot<T> {
    pub snapshot: T,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of stripping one document from canonical provenance lists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceCleanup {
    /// Entities that kept at least one other contributor.
    pub updated: u64,
    /// Entities whose provenance became empty and were removed, plus
    /// relationships detached from a removed concept.
    pub deleted: u64,
}

impl std::ops::AddAssign for ProvenanceCleanup {
    fn add_assign(&mut self, other: Self) {
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Every graph read and write the ingestion layer performs.
///
/// Group operations take one bounded slice and must apply it as a single
/// statement; partitioning is the caller's job (see `BatchWriter`). All
/// writes are idempotent under replay.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ── Documents ────────────────────────────────────────────────

    /// The non-deleted document registered under `filename`, if any.
    async fn find_active_document(
        &self,
        filename: &str,
    ) -> Result<Option<SourceDocument>, GraphError>;

    async fn get_document(&self, doc_id: &str) -> Result<Option<SourceDocument>, GraphError>;

    /// Create or overwrite a document keyed by `doc_id`.
    async fn save_document(&self, doc: &SourceDocument) -> Result<(), GraphError>;

    async fn documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<Vec<SourceDocument>, GraphError>;

    // ── Snapshots ────────────────────────────────────────────────

    /// Insert one group of concept snapshots linked to their document.
    async fn insert_concept_snapshots(
        &self,
        snapshots: &[ConceptSnapshot],
    ) -> Result<u64, GraphError>;

    /// Insert one group of relationship snapshots linked to their document.
    async fn insert_rel_snapshots(&self, snapshots: &[RelSnapshot]) -> Result<u64, GraphError>;

    /// Concept ids the document's snapshots reference.
    async fn document_concept_ids(&self, doc_id: &str) -> Result<Vec<String>, GraphError>;

    /// Relationship keys the document's snapshots reference.
    async fn document_rel_keys(&self, doc_id: &str) -> Result<Vec<RelKey>, GraphError>;

    /// Delete every snapshot of the document. Returns the count removed.
    async fn delete_document_snapshots(&self, doc_id: &str) -> Result<u64, GraphError>;

    /// Concept snapshots of COMMITTED documents for the given ids, plus
    /// those of `in_flight` whatever its status.
    async fn committed_concept_snapshots(
        &self,
        concept_ids: &[String],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<ConceptSnapshot>>, GraphError>;

    /// Relationship snapshots of COMMITTED documents for the given keys,
    /// plus those of `in_flight` whatever its status.
    async fn committed_rel_snapshots(
        &self,
        keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<RelSnapshot>>, GraphError>;

    // ── Canonical Entities ───────────────────────────────────────

    /// Grouped create-if-absent / update-if-present merge that appends
    /// `doc_id` to each concept's provenance when missing.
    async fn merge_concepts(
        &self,
        concepts: &[CanonicalConcept],
        doc_id: &str,
    ) -> Result<u64, GraphError>;

    /// Same as `merge_concepts` for one relationship kind. Relationships
    /// whose endpoints are not present are skipped.
    async fn merge_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
        doc_id: &str,
    ) -> Result<u64, GraphError>;

    /// Overwrite concepts wholesale, provenance included.
    async fn replace_concepts(&self, concepts: &[CanonicalConcept]) -> Result<u64, GraphError>;

    /// Overwrite relationships of one kind wholesale, provenance included.
    async fn replace_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
    ) -> Result<u64, GraphError>;

    /// Delete concepts and their incident relationships.
    async fn delete_concepts(&self, concept_ids: &[String]) -> Result<u64, GraphError>;

    /// Delete relationships of one kind.
    async fn delete_relationships(&self, kind: RelKind, keys: &[RelKey])
        -> Result<u64, GraphError>;

    async fn canonical_concepts(
        &self,
        concept_ids: &[String],
    ) -> Result<Vec<CanonicalConcept>, GraphError>;

    async fn canonical_relationships(
        &self,
        keys: &[RelKey],
    ) -> Result<Vec<CanonicalRelationship>, GraphError>;

    /// Remove `doc_id` from every concept's provenance, deleting concepts
    /// left without contributors.
    async fn strip_concept_provenance(&self, doc_id: &str)
        -> Result<ProvenanceCleanup, GraphError>;

    /// Remove `doc_id` from every relationship's provenance, deleting
    /// relationships left without contributors.
    async fn strip_relationship_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError>;

    /// Every concept id known to canonical state or to any snapshot.
    async fn all_concept_ids(&self) -> Result<Vec<String>, GraphError>;

    /// Every relationship key known to canonical state or to any snapshot.
    async fn all_rel_keys(&self) -> Result<Vec<RelKey>, GraphError>;
}

// ── Neo4j ────────────────────────────────────────────────────────

#[async_trait]
impl GraphStore for crate::client::GraphClient {
    async fn find_active_document(
        &self,
        filename: &str,
    ) -> Result<Option<SourceDocument>, GraphError> {
        Self::find_active_document(self, filename).await
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<SourceDocument>, GraphError> {
        Self::get_document(self, doc_id).await
    }

    async fn save_document(&self, doc: &SourceDocument) -> Result<(), GraphError> {
        Self::save_document(self, doc).await
    }

    async fn documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<Vec<SourceDocument>, GraphError> {
        Self::documents_with_status(self, status).await
    }

    async fn insert_concept_snapshots(
        &self,
        snapshots: &[ConceptSnapshot],
    ) -> Result<u64, GraphError> {
        Self::insert_concept_snapshots(self, snapshots).await
    }

    async fn insert_rel_snapshots(&self, snapshots: &[RelSnapshot]) -> Result<u64, GraphError> {
        Self::insert_rel_snapshots(self, snapshots).await
    }

    async fn document_concept_ids(&self, doc_id: &str) -> Result<Vec<String>, GraphError> {
        Self::document_concept_ids(self, doc_id).await
    }

    async fn document_rel_keys(&self, doc_id: &str) -> Result<Vec<RelKey>, GraphError> {
        Self::document_rel_keys(self, doc_id).await
    }

    async fn delete_document_snapshots(&self, doc_id: &str) -> Result<u64, GraphError> {
        Self::delete_document_snapshots(self, doc_id).await
    }

    async fn committed_concept_snapshots(
        &self,
        concept_ids: &[String],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<ConceptSnapshot>>, GraphError> {
        Self::committed_concept_snapshots(self, concept_ids, in_flight).await
    }

    async fn committed_rel_snapshots(
        &self,
        keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<RelSnapshot>>, GraphError> {
        Self::committed_rel_snapshots(self, keys, in_flight).await
    }

    async fn merge_concepts(
        &self,
        concepts: &[CanonicalConcept],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        Self::merge_concepts(self, concepts, doc_id).await
    }

    async fn merge_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        Self::merge_relationships(self, kind, relationships, doc_id).await
    }

    async fn replace_concepts(&self, concepts: &[CanonicalConcept]) -> Result<u64, GraphError> {
        Self::replace_concepts(self, concepts).await
    }

    async fn replace_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
    ) -> Result<u64, GraphError> {
        Self::replace_relationships(self, kind, relationships).await
    }

    async fn delete_concepts(&self, concept_ids: &[String]) -> Result<u64, GraphError> {
        Self::delete_concepts(self, concept_ids).await
    }

    async fn delete_relationships(
        &self,
        kind: RelKind,
        keys: &[RelKey],
    ) -> Result<u64, GraphError> {
        Self::delete_relationships(self, kind, keys).await
    }

    async fn canonical_concepts(
        &self,
        concept_ids: &[String],
    ) -> Result<Vec<CanonicalConcept>, GraphError> {
        Self::canonical_concepts(self, concept_ids).await
    }

    async fn canonical_relationships(
        &self,
        keys: &[RelKey],
    ) -> Result<Vec<CanonicalRelationship>, GraphError> {
        Self::canonical_relationships(self, keys).await
    }

    async fn strip_concept_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        Self::strip_concept_provenance(self, doc_id).await
    }

    async fn strip_relationship_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        Self::strip_relationship_provenance(self, doc_id).await
    }

    async fn all_concept_ids(&self) -> Result<Vec<String>, GraphError> {
        Self::all_concept_ids(self).await
    }

    async fn all_rel_keys(&self) -> Result<Vec<RelKey>, GraphError> {
        Self::all_rel_keys(self).await
    }
}
