//! Merge policy: derive one canonical entity from competing snapshots.
//!
//! The winner is the snapshot with the highest confidence. Ties go to the
//! most recently uploaded document, then to the larger doc id so the
//! result never depends on the order snapshots were read in. Fields the
//! winner leaves empty fall back to the prior canonical value.

use std::cmp::Ordering;

use lore_core::{CanonicalConcept, CanonicalRelationship, ConceptSnapshot, RelSnapshot};
use lore_graph::RankedSnapshot;

fn rank<T>(
    a: &RankedSnapshot<T>,
    b: &RankedSnapshot<T>,
    confidence: impl Fn(&T) -> f64,
    doc_id: impl Fn(&T) -> &str,
) -> Ordering {
    confidence(&a.snapshot)
        .total_cmp(&confidence(&b.snapshot))
        .then_with(|| a.uploaded_at.cmp(&b.uploaded_at))
        .then_with(|| doc_id(&a.snapshot).cmp(doc_id(&b.snapshot)))
}

/// Distinct contributing documents, oldest upload first.
fn provenance<T>(snapshots: &[RankedSnapshot<T>], doc_id: impl Fn(&T) -> &str) -> Vec<String> {
    let mut ranked: Vec<(&RankedSnapshot<T>, &str)> =
        snapshots.iter().map(|s| (s, doc_id(&s.snapshot))).collect();
    ranked.sort_by(|(a, a_id), (b, b_id)| a.uploaded_at.cmp(&b.uploaded_at).then(a_id.cmp(b_id)));

    let mut docs: Vec<String> = Vec::new();
    for (_, id) in ranked {
        if !docs.iter().any(|d| d == id) {
            docs.push(id.to_string());
        }
    }
    docs
}

/// Rebuild one concept. `None` means no COMMITTED document references it
/// any more and the canonical node should go.
pub fn merge_concept(
    snapshots: &[RankedSnapshot<ConceptSnapshot>],
    prior: Option<&CanonicalConcept>,
) -> Option<CanonicalConcept> {
    let winner = snapshots
        .iter()
        .max_by(|a, b| rank(a, b, |s| s.confidence, |s| s.doc_id.as_str()))?;
    let snap = &winner.snapshot;

    let name = if snap.name.trim().is_empty() {
        prior.map_or_else(|| snap.concept_id.clone(), |p| p.name.clone())
    } else {
        snap.name.clone()
    };
    let tags = if snap.tags.is_empty() {
        prior.map(|p| p.tags.clone()).unwrap_or_default()
    } else {
        snap.tags.clone()
    };

    Some(CanonicalConcept {
        concept_id: snap.concept_id.clone(),
        name,
        description: snap
            .description
            .clone()
            .or_else(|| prior.and_then(|p| p.description.clone())),
        bloom_level: snap.bloom_level.or_else(|| prior.and_then(|p| p.bloom_level)),
        difficulty: snap.difficulty.or_else(|| prior.and_then(|p| p.difficulty)),
        tags,
        confidence: snap.confidence,
        provenance: provenance(snapshots, |s| s.doc_id.as_str()),
    })
}

/// Rebuild one relationship; same policy as [`merge_concept`].
pub fn merge_relationship(
    snapshots: &[RankedSnapshot<RelSnapshot>],
    prior: Option<&CanonicalRelationship>,
) -> Option<CanonicalRelationship> {
    let winner = snapshots
        .iter()
        .max_by(|a, b| rank(a, b, |s| s.confidence, |s| s.doc_id.as_str()))?;
    let snap = &winner.snapshot;

    Some(CanonicalRelationship {
        source_id: snap.source_id.clone(),
        target_id: snap.target_id.clone(),
        kind: snap.rel_type,
        weight: snap.weight,
        dependency: snap.dependency.or_else(|| prior.and_then(|p| p.dependency)),
        confidence: snap.confidence,
        provenance: provenance(snapshots, |s| s.doc_id.as_str()),
    })
}
