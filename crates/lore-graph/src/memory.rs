//! In-process graph store.
//!
//! Mirrors the Neo4j statements closely enough for the ingestion layer to
//! be exercised without a database: same merge semantics, same
//! committed-plus-in-flight snapshot reads, same DETACH DELETE behaviour. Write
//! failures can be injected to test partial-application handling.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use lore_core::types::{append_provenance, strip_provenance};
use lore_core::{
    CanonicalConcept, CanonicalRelationship, ConceptSnapshot, DocumentStatus, RelKey, RelKind,
    RelSnapshot, SourceDocument,
};

use crate::client::GraphError;
use crate::store::{GraphStore, ProvenanceCleanup, RankedSnapshot};

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<String, SourceDocument>,
    concept_snapshots: BTreeMap<Uuid, ConceptSnapshot>,
    rel_snapshots: BTreeMap<Uuid, RelSnapshot>,
    concepts: BTreeMap<String, CanonicalConcept>,
    relationships: BTreeMap<RelKey, CanonicalRelationship>,
    /// Remaining write statements before an injected failure.
    write_budget: Option<usize>,
    writes: usize,
}

impl MemoryState {
    fn begin_write(&mut self) -> Result<(), GraphError> {
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(GraphError::Unavailable(
                    "injected write failure".to_string(),
                ));
            }
            *budget -= 1;
        }
        self.writes += 1;
        Ok(())
    }

    /// The document, when its snapshots count towards a rebuild.
    fn contributing(&self, doc_id: &str, in_flight: Option<&str>) -> Option<&SourceDocument> {
        self.documents
            .get(doc_id)
            .filter(|d| d.status == DocumentStatus::Committed || in_flight == Some(doc_id))
    }

    fn remove_concept(&mut self, concept_id: &str) -> bool {
        let removed = self.concepts.remove(concept_id).is_some();
        if removed {
            self.relationships
                .retain(|key, _| key.source_id != concept_id && key.target_id != concept_id);
        }
        removed
    }
}

/// A [`GraphStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryGraphStore {
    state: RwLock<MemoryState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `writes` write statements succeed, then fail every
    /// subsequent one until [`clear_failures`](Self::clear_failures).
    pub async fn fail_after(&self, writes: usize) {
        self.state.write().await.write_budget = Some(writes);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.write_budget = None;
    }

    /// Number of write statements applied so far.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }

    pub async fn concept(&self, concept_id: &str) -> Option<CanonicalConcept> {
        self.state.read().await.concepts.get(concept_id).cloned()
    }

    pub async fn relationship(&self, key: &RelKey) -> Option<CanonicalRelationship> {
        self.state.read().await.relationships.get(key).cloned()
    }

    pub async fn concept_ids(&self) -> Vec<String> {
        self.state.read().await.concepts.keys().cloned().collect()
    }

    pub async fn relationship_count(&self) -> usize {
        self.state.read().await.relationships.len()
    }

    /// Every document ever registered under `filename`, deleted ones included.
    pub async fn documents_for(&self, filename: &str) -> Vec<SourceDocument> {
        self.state
            .read()
            .await
            .documents
            .values()
            .filter(|d| d.filename == filename)
            .cloned()
            .collect()
    }

    /// Concept plus relationship snapshots held for one document.
    pub async fn snapshot_count(&self, doc_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .concept_snapshots
            .values()
            .filter(|s| s.doc_id == doc_id)
            .count()
            + state
                .rel_snapshots
                .values()
                .filter(|s| s.doc_id == doc_id)
                .count()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn find_active_document(
        &self,
        filename: &str,
    ) -> Result<Option<SourceDocument>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.filename == filename && d.status.is_active())
            .max_by_key(|d| d.uploaded_at)
            .cloned())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<SourceDocument>, GraphError> {
        Ok(self.state.read().await.documents.get(doc_id).cloned())
    }

    async fn save_document(&self, doc: &SourceDocument) -> Result<(), GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        state.documents.insert(doc.doc_id.clone(), doc.clone());
        Ok(())
    }

    async fn documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<Vec<SourceDocument>, GraphError> {
        let state = self.state.read().await;
        let mut docs: Vec<SourceDocument> = state
            .documents
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.updated_at);
        Ok(docs)
    }

    async fn insert_concept_snapshots(
        &self,
        snapshots: &[ConceptSnapshot],
    ) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut inserted = 0;
        for snapshot in snapshots {
            if !state.documents.contains_key(&snapshot.doc_id) {
                continue;
            }
            state
                .concept_snapshots
                .entry(snapshot.snapshot_id)
                .or_insert_with(|| snapshot.clone());
            state
                .concepts
                .entry(snapshot.concept_id.clone())
                .or_insert_with(|| CanonicalConcept {
                    concept_id: snapshot.concept_id.clone(),
                    name: snapshot.name.clone(),
                    description: None,
                    bloom_level: None,
                    difficulty: None,
                    tags: Vec::new(),
                    confidence: 0.0,
                    provenance: Vec::new(),
                });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn insert_rel_snapshots(&self, snapshots: &[RelSnapshot]) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut inserted = 0;
        for snapshot in snapshots {
            if !state.documents.contains_key(&snapshot.doc_id) {
                continue;
            }
            state
                .rel_snapshots
                .entry(snapshot.snapshot_id)
                .or_insert_with(|| snapshot.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn document_concept_ids(&self, doc_id: &str) -> Result<Vec<String>, GraphError> {
        let state = self.state.read().await;
        let ids: BTreeSet<String> = state
            .concept_snapshots
            .values()
            .filter(|s| s.doc_id == doc_id)
            .map(|s| s.concept_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn document_rel_keys(&self, doc_id: &str) -> Result<Vec<RelKey>, GraphError> {
        let state = self.state.read().await;
        let keys: BTreeSet<RelKey> = state
            .rel_snapshots
            .values()
            .filter(|s| s.doc_id == doc_id)
            .map(RelSnapshot::key)
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn delete_document_snapshots(&self, doc_id: &str) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let before = state.concept_snapshots.len() + state.rel_snapshots.len();
        state.concept_snapshots.retain(|_, s| s.doc_id != doc_id);
        state.rel_snapshots.retain(|_, s| s.doc_id != doc_id);
        let after = state.concept_snapshots.len() + state.rel_snapshots.len();
        Ok((before - after) as u64)
    }

    async fn committed_concept_snapshots(
        &self,
        concept_ids: &[String],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<ConceptSnapshot>>, GraphError> {
        let state = self.state.read().await;
        let wanted: BTreeSet<&str> = concept_ids.iter().map(String::as_str).collect();
        Ok(state
            .concept_snapshots
            .values()
            .filter(|s| wanted.contains(s.concept_id.as_str()))
            .filter_map(|s| {
                state.contributing(&s.doc_id, in_flight).map(|doc| RankedSnapshot {
                    snapshot: s.clone(),
                    uploaded_at: doc.uploaded_at,
                })
            })
            .collect())
    }

    async fn committed_rel_snapshots(
        &self,
        keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<RelSnapshot>>, GraphError> {
        let state = self.state.read().await;
        let wanted: BTreeSet<&RelKey> = keys.iter().collect();
        Ok(state
            .rel_snapshots
            .values()
            .filter(|s| wanted.contains(&s.key()))
            .filter_map(|s| {
                state.contributing(&s.doc_id, in_flight).map(|doc| RankedSnapshot {
                    snapshot: s.clone(),
                    uploaded_at: doc.uploaded_at,
                })
            })
            .collect())
    }

    async fn merge_concepts(
        &self,
        concepts: &[CanonicalConcept],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        for incoming in concepts {
            match state.concepts.get_mut(&incoming.concept_id) {
                Some(existing) => {
                    existing.name = incoming.name.clone();
                    if incoming.description.is_some() {
                        existing.description = incoming.description.clone();
                    }
                    if incoming.bloom_level.is_some() {
                        existing.bloom_level = incoming.bloom_level;
                    }
                    if incoming.difficulty.is_some() {
                        existing.difficulty = incoming.difficulty;
                    }
                    existing.tags = incoming.tags.clone();
                    existing.confidence = incoming.confidence;
                    append_provenance(&mut existing.provenance, doc_id);
                }
                None => {
                    let mut created = incoming.clone();
                    created.provenance = vec![doc_id.to_string()];
                    state.concepts.insert(created.concept_id.clone(), created);
                }
            }
        }
        Ok(concepts.len() as u64)
    }

    async fn merge_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
        doc_id: &str,
    ) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut merged = 0;
        for incoming in relationships.iter().filter(|r| r.kind == kind) {
            if !state.concepts.contains_key(&incoming.source_id)
                || !state.concepts.contains_key(&incoming.target_id)
            {
                continue;
            }
            match state.relationships.get_mut(&incoming.key()) {
                Some(existing) => {
                    existing.weight = incoming.weight;
                    if incoming.dependency.is_some() {
                        existing.dependency = incoming.dependency;
                    }
                    existing.confidence = incoming.confidence;
                    append_provenance(&mut existing.provenance, doc_id);
                }
                None => {
                    let mut created = incoming.clone();
                    created.provenance = vec![doc_id.to_string()];
                    state.relationships.insert(created.key(), created);
                }
            }
            merged += 1;
        }
        Ok(merged)
    }

    async fn replace_concepts(&self, concepts: &[CanonicalConcept]) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        for concept in concepts {
            state
                .concepts
                .insert(concept.concept_id.clone(), concept.clone());
        }
        Ok(concepts.len() as u64)
    }

    async fn replace_relationships(
        &self,
        kind: RelKind,
        relationships: &[CanonicalRelationship],
    ) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut replaced = 0;
        for rel in relationships.iter().filter(|r| r.kind == kind) {
            if !state.concepts.contains_key(&rel.source_id)
                || !state.concepts.contains_key(&rel.target_id)
            {
                continue;
            }
            state.relationships.insert(rel.key(), rel.clone());
            replaced += 1;
        }
        Ok(replaced)
    }

    async fn delete_concepts(&self, concept_ids: &[String]) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut deleted = 0;
        for id in concept_ids {
            if state.remove_concept(id) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_relationships(
        &self,
        kind: RelKind,
        keys: &[RelKey],
    ) -> Result<u64, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let mut deleted = 0;
        for key in keys.iter().filter(|k| k.kind == kind) {
            if state.relationships.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn canonical_concepts(
        &self,
        concept_ids: &[String],
    ) -> Result<Vec<CanonicalConcept>, GraphError> {
        let state = self.state.read().await;
        Ok(concept_ids
            .iter()
            .filter_map(|id| state.concepts.get(id).cloned())
            .collect())
    }

    async fn canonical_relationships(
        &self,
        keys: &[RelKey],
    ) -> Result<Vec<CanonicalRelationship>, GraphError> {
        let state = self.state.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| state.relationships.get(key).cloned())
            .collect())
    }

    async fn strip_concept_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let sole: Vec<String> = state
            .concepts
            .values()
            .filter(|c| c.provenance.len() == 1 && c.provenance[0] == doc_id)
            .map(|c| c.concept_id.clone())
            .collect();
        let relationships_before = state.relationships.len();
        for id in &sole {
            state.remove_concept(id);
        }
        let detached = relationships_before - state.relationships.len();
        let mut updated = 0;
        for concept in state.concepts.values_mut() {
            if strip_provenance(&mut concept.provenance, doc_id) {
                updated += 1;
            }
        }
        Ok(ProvenanceCleanup {
            updated,
            deleted: (sole.len() + detached) as u64,
        })
    }

    async fn strip_relationship_provenance(
        &self,
        doc_id: &str,
    ) -> Result<ProvenanceCleanup, GraphError> {
        let mut state = self.state.write().await;
        state.begin_write()?;
        let before = state.relationships.len();
        state
            .relationships
            .retain(|_, r| !(r.provenance.len() == 1 && r.provenance[0] == doc_id));
        let deleted = (before - state.relationships.len()) as u64;
        let mut updated = 0;
        for rel in state.relationships.values_mut() {
            if strip_provenance(&mut rel.provenance, doc_id) {
                updated += 1;
            }
        }
        Ok(ProvenanceCleanup { updated, deleted })
    }

    async fn all_concept_ids(&self) -> Result<Vec<String>, GraphError> {
        let state = self.state.read().await;
        let ids: BTreeSet<String> = state
            .concepts
            .keys()
            .cloned()
            .chain(state.concept_snapshots.values().map(|s| s.concept_id.clone()))
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn all_rel_keys(&self) -> Result<Vec<RelKey>, GraphError> {
        let state = self.state.read().await;
        let keys: BTreeSet<RelKey> = state
            .relationships
            .keys()
            .cloned()
            .chain(state.rel_snapshots.values().map(RelSnapshot::key))
            .collect();
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, confidence: f64) -> CanonicalConcept {
        CanonicalConcept {
            concept_id: id.to_string(),
            name: id.to_lowercase(),
            description: Some(format!("Description of {id}")),
            bloom_level: None,
            difficulty: Some(2),
            tags: vec![],
            confidence,
            provenance: vec![],
        }
    }

    #[tokio::test]
    async fn test_merge_keeps_prior_fields_when_absent() {
        let store = MemoryGraphStore::new();
        store.merge_concepts(&[concept("A", 0.5)], "d1").await.unwrap();

        let mut update = concept("A", 0.7);
        update.description = None;
        update.difficulty = None;
        store.merge_concepts(&[update], "d2").await.unwrap();

        let stored = store.concept("A").await.unwrap();
        assert_eq!(stored.description.as_deref(), Some("Description of A"));
        assert_eq!(stored.difficulty, Some(2));
        assert_eq!(stored.confidence, 0.7);
        assert_eq!(stored.provenance, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_relationships_need_both_endpoints() {
        let store = MemoryGraphStore::new();
        store.merge_concepts(&[concept("A", 0.5)], "d1").await.unwrap();

        let rel = CanonicalRelationship {
            source_id: "A".to_string(),
            target_id: "B".to_string(),
            kind: RelKind::Requires,
            weight: 1.0,
            dependency: None,
            confidence: 0.9,
            provenance: vec![],
        };
        let merged = store
            .merge_relationships(RelKind::Requires, &[rel], "d1")
            .await
            .unwrap();
        assert_eq!(merged, 0);
        assert_eq!(store.relationship_count().await, 0);
    }

    #[tokio::test]
    async fn test_deleting_a_concept_detaches_relationships() {
        let store = MemoryGraphStore::new();
        store
            .merge_concepts(&[concept("A", 0.5), concept("B", 0.5)], "d1")
            .await
            .unwrap();
        let rel = CanonicalRelationship {
            source_id: "A".to_string(),
            target_id: "B".to_string(),
            kind: RelKind::BuildsOn,
            weight: 0.5,
            dependency: None,
            confidence: 0.9,
            provenance: vec![],
        };
        store
            .merge_relationships(RelKind::BuildsOn, &[rel], "d1")
            .await
            .unwrap();
        assert_eq!(store.relationship_count().await, 1);

        store.delete_concepts(&["B".to_string()]).await.unwrap();
        assert_eq!(store.relationship_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_stops_writes() {
        let store = MemoryGraphStore::new();
        store.fail_after(1).await;
        store.merge_concepts(&[concept("A", 0.5)], "d1").await.unwrap();
        let err = store.merge_concepts(&[concept("B", 0.5)], "d1").await;
        assert!(matches!(err, Err(GraphError::Unavailable(_))));
        assert!(store.concept("B").await.is_none());

        store.clear_failures().await;
        store.merge_concepts(&[concept("B", 0.5)], "d1").await.unwrap();
        assert!(store.concept("B").await.is_some());
    }
}
