//! Write operations for the knowledge graph.
//!
//! Every statement takes a bounded group of rows through `UNWIND $rows` and
//! uses MERGE semantics, so replaying a group after a partial failure is
//! harmless. Documents are identified by `doc_id`, concepts by `id`,
//! snapshots by `snapshot_id`.

use chrono::Utc;
use neo4rs::{query, BoltMap, BoltNull, BoltString, BoltType};

use lore_core::{
    CanonicalConcept, CanonicalRelationship, ConceptSnapshot, RelKey, RelKind, RelSnapshot,
    SourceDocument,
};

use crate::client::{GraphClient, GraphError};
use crate::statements;
use crate::store::ProvenanceCleanup;

impl GraphClient {
    // ── Documents ────────────────────────────────────────────────

    /// Create or overwrite a SourceDocument node.
    pub async fn save_document(&self, doc: &SourceDocument) -> Result<(), GraphError> {
        let q = query(statements::SAVE_DOCUMENT)
            .param("doc_id", doc.doc_id.clone())
            .param("filename", doc.filename.clone())
            .param("checksum", doc.checksum.clone())
            .param("status", doc.status.as_str().to_string())
            .param("uploaded_at", doc.uploaded_at.to_rfc3339())
            .param("updated_at", doc.updated_at.to_rfc3339());

        self.run(q).await
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Insert one group of concept snapshots.
    pub async fn insert_concept_snapshots(
        &self,
        snapshots: &[ConceptSnapshot],
    ) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = snapshots.iter().map(concept_snapshot_row).collect();
        let q = query(statements::INSERT_CONCEPT_SNAPSHOTS).param("rows", rows);
        self.query_count(q).await
    }

    /// Insert one group of relationship snapshots.
    pub async fn insert_rel_snapshots(&self, snapshots: &[RelSnapshot]) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = snapshots.iter().map(rel_snapshot_row).collect();
        let q = query(statements::INSERT_REL_SNAPSHOTS).param("rows", rows);
        self.query_count(q).await
    }

    /// Delete all snapshots extracted from one document.
    pub async fn delete_document_snapshots(&self, doc_id: &str) -> Result<u64, GraphError> {
        let q = query(statements::DELETE_DOCUMENT_SNAPSHOTS).param("doc_id", doc_id.to_string());
        self.query_count(q).await
    }

    // ── Canonical Concepts ───────────────────────────────────────

    /// Grouped upsert with provenance append.
    pub async fn merge_concepts(
        &self,
        concepts: &[CanonicalConcept],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = concepts.iter().map(concept_row).collect();
        let q = query(statements::MERGE_CONCEPTS)
            .param("rows", rows)
            .param("doc_id", doc_id.to_string())
            .param("now", Utc::now().to_rfc3339());
        self.query_count(q).await
    }

    /// Grouped overwrite, provenance included.
    pub async fn replace_concepts(&self, concepts: &[CanonicalConcept]) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = concepts.iter().map(concept_row).collect();
        let q = query(statements::REPLACE_CONCEPTS)
            .param("rows", rows)
            .param("now", Utc::now().to_rfc3339());
        self.query_count(q).await
    }

    pub async fn delete_concepts(&self, concept_ids: &[String]) -> Result<u64, GraphError> {
        let q = query(statements::DELETE_CONCEPTS).param("ids", concept_ids.to_vec());
        self.query_count(q).await
    }

    // ── Canonical Relationships ──────────────────────────────────

    /// Grouped upsert of one relationship kind with provenance append.
    pub async fn merge_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = relationships.iter().map(relationship_row).collect();
        let q = query(statements::for_kind(kind).merge)
            .param("rows", rows)
            .param("doc_id", doc_id.to_string())
            .param("now", Utc::now().to_rfc3339());
        self.query_count(q).await
    }

    /// Grouped overwrite of one relationship kind, provenance included.
    pub async fn replace_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
    ) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = relationships.iter().map(relationship_row).collect();
        let q = query(statements::for_kind(kind).replace)
            .param("rows", rows)
            .param("now", Utc::now().to_rfc3339());
        self.query_count(q).await
    }

    pub async fn delete_relationships(
        &self,
        kind: RelKind,
        keys: &[RelKey],
    ) -> Result<u64, GraphError> {
        let rows: Vec<BoltType> = keys.iter().map(key_row).collect();
        let q = query(statements::for_kind(kind).delete).param("rows", rows);
        self.query_count(q).await
    }

    // ── Provenance ───────────────────────────────────────────────

    /// Strip `doc_id` from concept provenance; sole-owned concepts go first.
    pub async fn strip_concept_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        let deleted = self
            .query_count(
                query(statements::STRIP_CONCEPTS_SOLE_OWNER).param("doc_id", doc_id.to_string()),
            )
            .await?;
        let updated = self
            .query_count(
                query(statements::STRIP_CONCEPTS_SHARED).param("doc_id", doc_id.to_string()),
            )
            .await?;
        Ok(ProvenanceCleanup { updated, deleted })
    }

    /// Strip `doc_id` from relationship provenance.
    pub async fn strip_relationship_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        let deleted = self
            .query_count(
                query(statements::STRIP_RELATIONSHIPS_SOLE_OWNER)
                    .param("doc_id", doc_id.to_string()),
            )
            .await?;
        let updated = self
            .query_count(
                query(statements::STRIP_RELATIONSHIPS_SHARED).param("doc_id", doc_id.to_string()),
            )
            .await?;
        Ok(ProvenanceCleanup { updated, deleted })
    }
}

// ── Row Builders ─────────────────────────────────────────────────

fn bolt_row(fields: Vec<(&str, BoltType)>) -> BoltType {
    let mut map = BoltMap::new();
    for (key, value) in fields {
        map.put(BoltString::from(key), value);
    }
    BoltType::Map(map)
}

fn nullable<T: Into<BoltType>>(value: Option<T>) -> BoltType {
    value.map(Into::into).unwrap_or(BoltType::Null(BoltNull))
}

fn concept_snapshot_row(s: &ConceptSnapshot) -> BoltType {
    bolt_row(vec![
        ("snapshot_id", s.snapshot_id.to_string().into()),
        ("doc_id", s.doc_id.clone().into()),
        ("concept_id", s.concept_id.clone().into()),
        ("name", s.name.clone().into()),
        ("description", nullable(s.description.clone())),
        ("bloom_level", nullable(s.bloom_level.map(|b| b.as_str().to_string()))),
        ("difficulty", nullable(s.difficulty.map(i64::from))),
        ("tags", s.tags.clone().into()),
        ("confidence", s.confidence.into()),
    ])
}

fn rel_snapshot_row(s: &RelSnapshot) -> BoltType {
    bolt_row(vec![
        ("snapshot_id", s.snapshot_id.to_string().into()),
        ("doc_id", s.doc_id.clone().into()),
        ("rel_type", s.rel_type.as_str().to_string().into()),
        ("source_id", s.source_id.clone().into()),
        ("target_id", s.target_id.clone().into()),
        ("weight", s.weight.into()),
        ("dependency", nullable(s.dependency.map(|d| d.as_str().to_string()))),
        ("confidence", s.confidence.into()),
    ])
}

fn concept_row(c: &CanonicalConcept) -> BoltType {
    bolt_row(vec![
        ("concept_id", c.concept_id.clone().into()),
        ("name", c.name.clone().into()),
        ("description", nullable(c.description.clone())),
        ("bloom_level", nullable(c.bloom_level.map(|b| b.as_str().to_string()))),
        ("difficulty", nullable(c.difficulty.map(i64::from))),
        ("tags", c.tags.clone().into()),
        ("confidence", c.confidence.into()),
        ("provenance", c.provenance.clone().into()),
    ])
}

fn relationship_row(r: &CanonicalRelationship) -> BoltType {
    bolt_row(vec![
        ("source_id", r.source_id.clone().into()),
        ("target_id", r.target_id.clone().into()),
        ("weight", r.weight.into()),
        ("dependency", nullable(r.dependency.map(|d| d.as_str().to_string()))),
        ("confidence", r.confidence.into()),
        ("provenance", r.provenance.clone().into()),
    ])
}

pub(crate) fn key_row(k: &RelKey) -> BoltType {
    bolt_row(vec![
        ("source_id", k.source_id.clone().into()),
        ("target_id", k.target_id.clone().into()),
        ("rel_type", k.kind.as_str().to_string().into()),
    ])
}
