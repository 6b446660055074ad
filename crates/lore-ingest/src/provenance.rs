//! Document lifecycle and canonical rebuild.
//!
//! The [`ProvenanceManager`] owns every write that changes which documents
//! count towards canonical state. Snapshots are immutable; canonical
//! concepts and relationships are only ever written by the delta rebuild,
//! which recomputes them from the snapshots of COMMITTED documents and of
//! the one document an overwrite is about to commit.
//!
//! None of the sequences here are atomic at the storage layer. A failure
//! part way leaves the document PROCESSING, and re-running the same call
//! (or a recovery sweep) converges because every step is idempotent.
//! Callers must serialise calls for the same filename.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use lore_core::{
    CanonicalConcept, CanonicalRelationship, ConceptSnapshot, DocumentStatus, ExtractedConcept,
    ExtractedRelationship, RelKey, RelSnapshot, SourceDocument,
};
use lore_graph::{BatchWriter, GraphError, GraphStore, ProvenanceCleanup, WriteSummary};

use crate::merge::{merge_concept, merge_relationship};

/// Whether an overwrite wrote anything.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverwriteStatus {
    Skipped,
    Committed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub inserted: u64,
    pub deleted: u64,
}

/// Canonical entities touched by a rebuild.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Entities rewritten from their winning snapshot.
    pub rebuilt: u64,
    /// Entities removed because no COMMITTED snapshot references them.
    pub deleted: u64,
}

impl std::ops::AddAssign for RebuildSummary {
    fn add_assign(&mut self, other: Self) {
        self.rebuilt += other.rebuilt;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverwriteResult {
    pub status: OverwriteStatus,
    pub doc_id: String,
    /// A live document already existed under the filename.
    pub was_overwrite: bool,
    /// The previous document, when it was marked DELETED by this call.
    pub superseded_doc_id: Option<String>,
    /// An unfinished ingestion of the same content was picked up again.
    pub resumed: bool,
    pub snapshots: SnapshotCounts,
    pub canonical: RebuildSummary,
}

impl OverwriteResult {
    fn skipped(doc_id: &str) -> Self {
        Self {
            status: OverwriteStatus::Skipped,
            doc_id: doc_id.to_string(),
            was_overwrite: false,
            superseded_doc_id: None,
            resumed: false,
            snapshots: SnapshotCounts::default(),
            canonical: RebuildSummary::default(),
        }
    }
}

/// Result of taking one document out of canonical state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RemovalResult {
    pub doc_id: String,
    pub snapshots_deleted: u64,
    pub provenance: ProvenanceCleanup,
    pub canonical: RebuildSummary,
}

/// Concept ids and relationship keys a rebuild must revisit.
#[derive(Debug, Default)]
struct Scope {
    concept_ids: BTreeSet<String>,
    rel_keys: BTreeSet<RelKey>,
}

impl Scope {
    fn extend_concepts(&mut self, ids: impl IntoIterator<Item = String>) {
        self.concept_ids.extend(ids);
    }

    fn extend_relationships(&mut self, keys: impl IntoIterator<Item = RelKey>) {
        self.rel_keys.extend(keys);
    }
}

#[derive(Clone)]
pub struct ProvenanceManager {
    store: Arc<dyn GraphStore>,
    writer: BatchWriter,
}

impl ProvenanceManager {
    pub fn new(writer: BatchWriter) -> Self {
        Self {
            store: Arc::clone(writer.store()),
            writer,
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    // ── Overwrite ────────────────────────────────────────────────

    /// Make `doc_id` the live document for `filename` and fold its
    /// extraction into canonical state.
    ///
    /// An identical COMMITTED document makes this a no-op. An identical
    /// document left PROCESSING or FAILED is resumed. Any other live
    /// document under the filename is superseded: its snapshots are
    /// deleted and it is marked DELETED before the new snapshots go in.
    /// The closing rebuild covers exactly the ids either version touched,
    /// and the document becomes COMMITTED only once it has succeeded.
    pub async fn overwrite_document(
        &self,
        doc_id: &str,
        filename: &str,
        checksum: &str,
        concepts: &[ExtractedConcept],
        relationships: &[ExtractedRelationship],
    ) -> Result<OverwriteResult, GraphError> {
        let existing = self.store.find_active_document(filename).await?;

        if let Some(existing) = existing.as_ref() {
            if existing.checksum == checksum && existing.status == DocumentStatus::Committed {
                info!(
                    doc_id,
                    filename,
                    existing_doc_id = %existing.doc_id,
                    "Identical document already committed, skipping"
                );
                return Ok(OverwriteResult::skipped(&existing.doc_id));
            }
        }

        let mut scope = Scope::default();
        let mut snapshots = SnapshotCounts::default();
        let mut superseded_doc_id = None;
        let resumed = existing.as_ref().is_some_and(|e| e.checksum == checksum);

        if let Some(existing) = existing.as_ref() {
            scope.extend_concepts(self.store.document_concept_ids(&existing.doc_id).await?);
            scope.extend_relationships(self.store.document_rel_keys(&existing.doc_id).await?);
            snapshots.deleted = self.store.delete_document_snapshots(&existing.doc_id).await?;

            if existing.doc_id != doc_id {
                let mut old = existing.clone();
                self.transition(&mut old, DocumentStatus::Deleted).await?;
                self.writer.remove_stale_provenance(&old.doc_id).await?;
                info!(
                    doc_id,
                    filename,
                    superseded_doc_id = %old.doc_id,
                    snapshots_deleted = snapshots.deleted,
                    "Document superseded"
                );
                superseded_doc_id = Some(old.doc_id);
            } else if !resumed {
                self.writer.remove_stale_provenance(doc_id).await?;
            }
        }

        let mut doc = match existing.as_ref() {
            Some(e) if resumed && e.doc_id == doc_id => e.clone(),
            _ => SourceDocument::new(doc_id, filename, checksum),
        };
        if resumed {
            info!(doc_id, filename, from = %doc.status, "Resuming unfinished ingestion");
        }
        self.transition(&mut doc, DocumentStatus::Processing).await?;

        let concept_snapshots: Vec<ConceptSnapshot> = concepts
            .iter()
            .cloned()
            .map(|c| ConceptSnapshot::from_extracted(doc_id, c))
            .collect();
        let rel_snapshots: Vec<RelSnapshot> = relationships
            .iter()
            .cloned()
            .map(|r| RelSnapshot::from_extracted(doc_id, r))
            .collect();
        scope.extend_concepts(concept_snapshots.iter().map(|s| s.concept_id.clone()));
        scope.extend_relationships(rel_snapshots.iter().map(RelSnapshot::key));

        // Snapshot ids are random so the two inserts never touch the same rows.
        let (concept_writes, rel_writes) = tokio::try_join!(
            self.writer.insert_concept_snapshots(&concept_snapshots),
            self.writer.insert_relationship_snapshots(&rel_snapshots),
        )?;
        snapshots.inserted = concept_writes.upserted + rel_writes.upserted;

        // The rebuild counts this document's snapshots before it is COMMITTED,
        // so a failure here leaves it PROCESSING for a retry or the sweep.
        let canonical = self.rebuild_scope(&scope, Some(doc_id)).await?;
        self.transition(&mut doc, DocumentStatus::Committed).await?;

        info!(
            doc_id,
            filename,
            snapshots_inserted = snapshots.inserted,
            snapshots_deleted = snapshots.deleted,
            rebuilt = canonical.rebuilt,
            removed = canonical.deleted,
            "Document committed"
        );

        Ok(OverwriteResult {
            status: OverwriteStatus::Committed,
            doc_id: doc_id.to_string(),
            was_overwrite: existing.is_some(),
            superseded_doc_id,
            resumed,
            snapshots,
            canonical,
        })
    }

    // ── Removal and failure ──────────────────────────────────────

    /// Take a document out of canonical state entirely.
    pub async fn delete_document(&self, doc_id: &str) -> Result<RemovalResult, GraphError> {
        let mut doc = self
            .store
            .get_document(doc_id)
            .await?
            .ok_or_else(|| GraphError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })?;

        let scope = self.capture_scope(doc_id).await?;
        let snapshots_deleted = self.store.delete_document_snapshots(doc_id).await?;
        if doc.status != DocumentStatus::Deleted {
            self.transition(&mut doc, DocumentStatus::Deleted).await?;
        }
        let provenance = self.writer.remove_stale_provenance(doc_id).await?;
        let canonical = self.rebuild_scope(&scope, None).await?;

        info!(
            doc_id,
            filename = %doc.filename,
            snapshots_deleted,
            rebuilt = canonical.rebuilt,
            removed = canonical.deleted,
            "Document deleted"
        );
        Ok(RemovalResult {
            doc_id: doc_id.to_string(),
            snapshots_deleted,
            provenance,
            canonical,
        })
    }

    /// Mark an abandoned PROCESSING document FAILED and undo whatever it
    /// managed to write to canonical state. Its snapshots stay until the
    /// next attempt replaces them.
    pub async fn fail_document(&self, doc: &SourceDocument) -> Result<RebuildSummary, GraphError> {
        let mut doc = doc.clone();
        let scope = self.capture_scope(&doc.doc_id).await?;
        self.transition(&mut doc, DocumentStatus::Failed).await?;
        self.writer.remove_stale_provenance(&doc.doc_id).await?;
        let summary = self.rebuild_scope(&scope, None).await?;
        warn!(
            doc_id = %doc.doc_id,
            filename = %doc.filename,
            rebuilt = summary.rebuilt,
            removed = summary.deleted,
            "Document marked failed"
        );
        Ok(summary)
    }

    // ── Rebuild ──────────────────────────────────────────────────

    /// Recompute the given canonical concepts and relationships from the
    /// snapshots of COMMITTED documents. Concepts go first so that
    /// relationship writes find their endpoints.
    pub async fn rebuild_delta(
        &self,
        concept_ids: &[String],
        rel_keys: &[RelKey],
    ) -> Result<RebuildSummary, GraphError> {
        self.rebuild_with(concept_ids, rel_keys, None).await
    }

    /// `in_flight` names a PROCESSING document whose snapshots count as if
    /// it were already COMMITTED.
    async fn rebuild_with(
        &self,
        concept_ids: &[String],
        rel_keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<RebuildSummary, GraphError> {
        let mut summary = RebuildSummary::default();
        for chunk in concept_ids.chunks(self.writer.batch_size()) {
            summary += self.rebuild_concepts(chunk, in_flight).await?;
        }
        for chunk in rel_keys.chunks(self.writer.batch_size()) {
            summary += self.rebuild_relationships(chunk, in_flight).await?;
        }
        debug!(
            concepts = concept_ids.len(),
            relationships = rel_keys.len(),
            rebuilt = summary.rebuilt,
            removed = summary.deleted,
            "Delta rebuild finished"
        );
        Ok(summary)
    }

    /// Maintenance variant of [`rebuild_delta`](Self::rebuild_delta) over
    /// every known concept id and relationship key.
    pub async fn rebuild_all(&self) -> Result<RebuildSummary, GraphError> {
        let concept_ids = self.store.all_concept_ids().await?;
        let rel_keys = self.store.all_rel_keys().await?;
        let summary = self.rebuild_delta(&concept_ids, &rel_keys).await?;
        info!(
            concepts = concept_ids.len(),
            relationships = rel_keys.len(),
            rebuilt = summary.rebuilt,
            removed = summary.deleted,
            "Full rebuild finished"
        );
        Ok(summary)
    }

    async fn rebuild_scope(
        &self,
        scope: &Scope,
        in_flight: Option<&str>,
    ) -> Result<RebuildSummary, GraphError> {
        let concept_ids: Vec<String> = scope.concept_ids.iter().cloned().collect();
        let rel_keys: Vec<RelKey> = scope.rel_keys.iter().cloned().collect();
        self.rebuild_with(&concept_ids, &rel_keys, in_flight).await
    }

    async fn rebuild_concepts(
        &self,
        ids: &[String],
        in_flight: Option<&str>,
    ) -> Result<RebuildSummary, GraphError> {
        let mut by_id: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for ranked in self.store.committed_concept_snapshots(ids, in_flight).await? {
            by_id
                .entry(ranked.snapshot.concept_id.clone())
                .or_default()
                .push(ranked);
        }
        let priors: BTreeMap<String, CanonicalConcept> = self
            .store
            .canonical_concepts(ids)
            .await?
            .into_iter()
            .map(|c| (c.concept_id.clone(), c))
            .collect();

        let mut rebuilt = Vec::new();
        let mut orphaned = Vec::new();
        for id in ids {
            let snapshots = by_id.get(id).map(Vec::as_slice).unwrap_or(&[]);
            match merge_concept(snapshots, priors.get(id)) {
                Some(concept) => rebuilt.push(concept),
                None if priors.contains_key(id) => orphaned.push(id.clone()),
                None => {}
            }
        }

        let written = self.writer.apply_concepts(&rebuilt).await?;
        let deleted = self.writer.delete_concepts(&orphaned).await?;
        Ok(summary_of(written, deleted))
    }

    async fn rebuild_relationships(
        &self,
        keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<RebuildSummary, GraphError> {
        let mut by_key: BTreeMap<RelKey, Vec<_>> = BTreeMap::new();
        for ranked in self.store.committed_rel_snapshots(keys, in_flight).await? {
            by_key.entry(ranked.snapshot.key()).or_default().push(ranked);
        }
        let priors: BTreeMap<RelKey, CanonicalRelationship> = self
            .store
            .canonical_relationships(keys)
            .await?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        let mut rebuilt = Vec::new();
        let mut orphaned = Vec::new();
        for key in keys {
            let snapshots = by_key.get(key).map(Vec::as_slice).unwrap_or(&[]);
            match merge_relationship(snapshots, priors.get(key)) {
                Some(rel) => rebuilt.push(rel),
                None if priors.contains_key(key) => orphaned.push(key.clone()),
                None => {}
            }
        }

        let written = self.writer.apply_relationships(&rebuilt).await?;
        let deleted = self.writer.delete_relationships(&orphaned).await?;
        Ok(summary_of(written, deleted))
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn capture_scope(&self, doc_id: &str) -> Result<Scope, GraphError> {
        let mut scope = Scope::default();
        scope.extend_concepts(self.store.document_concept_ids(doc_id).await?);
        scope.extend_relationships(self.store.document_rel_keys(doc_id).await?);
        Ok(scope)
    }

    async fn transition(
        &self,
        doc: &mut SourceDocument,
        next: DocumentStatus,
    ) -> Result<(), GraphError> {
        if !doc.status.can_transition_to(next) {
            warn!(
                doc_id = %doc.doc_id,
                from = %doc.status,
                to = %next,
                "Unexpected document status transition"
            );
        }
        doc.status = next;
        doc.updated_at = Utc::now();
        self.store.save_document(doc).await
    }
}

fn summary_of(written: WriteSummary, deleted: u64) -> RebuildSummary {
    RebuildSummary {
        rebuilt: written.upserted,
        deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::{BloomLevel, RelKind};
    use lore_graph::MemoryGraphStore;

    fn concept(id: &str, confidence: f64) -> ExtractedConcept {
        ExtractedConcept {
            concept_id: id.to_string(),
            name: id.to_lowercase(),
            description: Some(format!("About {id} in some detail")),
            bloom_level: Some(BloomLevel::Understand),
            difficulty: Some(2),
            tags: Vec::new(),
            confidence,
        }
    }

    fn requires(source: &str, target: &str) -> ExtractedRelationship {
        ExtractedRelationship {
            kind: RelKind::Requires,
            source_id: source.to_string(),
            target_id: target.to_string(),
            weight: 1.0,
            dependency: None,
            confidence: 1.0,
        }
    }

    fn manager() -> (Arc<MemoryGraphStore>, ProvenanceManager) {
        let store = Arc::new(MemoryGraphStore::new());
        let writer = BatchWriter::with_batch_size(store.clone(), 2);
        (store, ProvenanceManager::new(writer))
    }

    #[tokio::test]
    async fn test_rebuild_with_no_snapshots_removes_placeholder() {
        let (store, manager) = manager();
        store
            .merge_concepts(
                &[CanonicalConcept::from_extracted(&concept("A", 1.0), "D1")],
                "D1",
            )
            .await
            .unwrap();

        let summary = manager.rebuild_delta(&["A".to_string()], &[]).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(store.concept("A").await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_commits_and_builds_canonical_state() {
        let (store, manager) = manager();
        let result = manager
            .overwrite_document(
                "D1",
                "notes.md",
                "c1",
                &[concept("A", 0.9), concept("B", 0.8), concept("C", 0.7)],
                &[requires("B", "A"), requires("C", "B")],
            )
            .await
            .unwrap();

        assert_eq!(result.status, OverwriteStatus::Committed);
        assert!(!result.was_overwrite);
        assert_eq!(result.snapshots.inserted, 5);
        assert_eq!(result.canonical.rebuilt, 5);

        let doc = store.get_document("D1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Committed);
        assert_eq!(store.concept("A").await.unwrap().provenance, vec!["D1"]);
        assert_eq!(store.relationship_count().await, 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_document_is_an_error() {
        let (_, manager) = manager();
        let err = manager.delete_document("missing").await.unwrap_err();
        assert!(matches!(err, GraphError::DocumentNotFound { .. }));
    }
}
