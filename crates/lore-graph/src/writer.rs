//! Bounded-group writes against a [`GraphStore`].
//!
//! Groups are applied sequentially. The first failing group aborts the
//! call and later groups are never attempted, so a failed call may leave
//! earlier groups applied. Every statement is idempotent, so re-running the
//! same call (or a rebuild) converges.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use lore_core::{
    CanonicalConcept, CanonicalRelationship, ConceptSnapshot, RelKey, RelKind, RelSnapshot,
};

use crate::client::GraphError;
use crate::store::{GraphStore, ProvenanceCleanup};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Totals for one writer call.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct WriteSummary {
    /// Rows the store reported as written.
    pub upserted: u64,
    /// Group statements issued.
    pub batches: u64,
}

impl std::ops::AddAssign for WriteSummary {
    fn add_assign(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.batches += other.batches;
    }
}

#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_batch_size(store, DEFAULT_BATCH_SIZE)
    }

    /// A zero batch size is treated as one.
    pub fn with_batch_size(store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    // ── Provenance-appending upserts ─────────────────────────────

    /// Merge concepts in groups, appending `doc_id` to each one's provenance.
    pub async fn upsert_concepts(
        &self,
        concepts: &[CanonicalConcept],
        doc_id: &str,
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for (index, group) in concepts.chunks(self.batch_size).enumerate() {
            let written = self.store.merge_concepts(group, doc_id).await?;
            debug!(doc_id, group = index, rows = group.len(), written, "Merged concept group");
            summary += WriteSummary {
                upserted: written,
                batches: 1,
            };
        }
        Ok(summary)
    }

    /// Merge relationships one kind at a time, then in groups within a kind.
    pub async fn upsert_relationships(
        &self,
        relationships: &[CanonicalRelationship],
        doc_id: &str,
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for (kind, rels) in partition_by_kind(relationships, |r| r.kind) {
            for (index, group) in rels.chunks(self.batch_size).enumerate() {
                let written = self.store.merge_relationships(kind, group, doc_id).await?;
                debug!(
                    doc_id,
                    kind = %kind,
                    group = index,
                    rows = group.len(),
                    written,
                    "Merged relationship group"
                );
                summary += WriteSummary {
                    upserted: written,
                    batches: 1,
                };
            }
        }
        Ok(summary)
    }

    /// Strip `doc_id` from every canonical entity's provenance. Entities
    /// left without contributors are deleted. Relationships go first so a
    /// concept deletion never races a relationship update.
    pub async fn remove_stale_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        let mut cleanup = self.store.strip_relationship_provenance(doc_id).await?;
        cleanup += self.store.strip_concept_provenance(doc_id).await?;
        debug!(
            doc_id,
            updated = cleanup.updated,
            deleted = cleanup.deleted,
            "Removed stale provenance"
        );
        Ok(cleanup)
    }

    // ── Snapshots ────────────────────────────────────────────────

    pub async fn insert_concept_snapshots(
        &self,
        snapshots: &[ConceptSnapshot],
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for (index, group) in snapshots.chunks(self.batch_size).enumerate() {
            let written = self.store.insert_concept_snapshots(group).await?;
            debug!(group = index, rows = group.len(), written, "Inserted concept snapshots");
            summary += WriteSummary {
                upserted: written,
                batches: 1,
            };
        }
        Ok(summary)
    }

    pub async fn insert_relationship_snapshots(
        &self,
        snapshots: &[RelSnapshot],
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for (index, group) in snapshots.chunks(self.batch_size).enumerate() {
            let written = self.store.insert_rel_snapshots(group).await?;
            debug!(group = index, rows = group.len(), written, "Inserted relationship snapshots");
            summary += WriteSummary {
                upserted: written,
                batches: 1,
            };
        }
        Ok(summary)
    }

    // ── Rebuild writes ───────────────────────────────────────────

    /// Overwrite concepts wholesale, provenance included.
    pub async fn apply_concepts(
        &self,
        concepts: &[CanonicalConcept],
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for group in concepts.chunks(self.batch_size) {
            summary += WriteSummary {
                upserted: self.store.replace_concepts(group).await?,
                batches: 1,
            };
        }
        Ok(summary)
    }

    /// Overwrite relationships wholesale, provenance included.
    pub async fn apply_relationships(
        &self,
        relationships: &[CanonicalRelationship],
    ) -> Result<WriteSummary, GraphError> {
        let mut summary = WriteSummary::default();
        for (kind, rels) in partition_by_kind(relationships, |r| r.kind) {
            for group in rels.chunks(self.batch_size) {
                summary += WriteSummary {
                    upserted: self.store.replace_relationships(kind, group).await?,
                    batches: 1,
                };
            }
        }
        Ok(summary)
    }

    pub async fn delete_concepts(&self, concept_ids: &[String]) -> Result<u64, GraphError> {
        let mut deleted = 0;
        for group in concept_ids.chunks(self.batch_size) {
            deleted += self.store.delete_concepts(group).await?;
        }
        Ok(deleted)
    }

    pub async fn delete_relationships(&self, keys: &[RelKey]) -> Result<u64, GraphError> {
        let mut deleted = 0;
        for (kind, kind_keys) in partition_by_kind(keys, |k| k.kind) {
            for group in kind_keys.chunks(self.batch_size) {
                deleted += self.store.delete_relationships(kind, group).await?;
            }
        }
        Ok(deleted)
    }
}

/// Split items by relationship kind, preserving input order within a kind.
fn partition_by_kind<T: Clone>(
    items: &[T],
    kind_of: impl Fn(&T) -> RelKind,
) -> BTreeMap<RelKind, Vec<T>> {
    let mut by_kind: BTreeMap<RelKind, Vec<T>> = BTreeMap::new();
    for item in items {
        by_kind.entry(kind_of(item)).or_default().push(item.clone());
    }
    by_kind
}
