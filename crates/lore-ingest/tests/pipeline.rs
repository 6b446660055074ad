//! End-to-end ingestion through the registry gate, the validator and the
//! provenance manager, backed by in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use lore_core::{DocumentStatus, RelKey, RelKind};
use lore_graph::{BatchWriter, GraphStore, MemoryGraphStore};
use lore_ingest::{IngestError, IngestPipeline, IngestRequest, RecoverySweep};
use lore_registry::{ChecksumRegistry, MemoryKvStore, RegistryStatus};
use lore_validate::{
    CandidateBatch, CandidateConcept, CandidateRelationship, Rule, Severity, StructuralValidator,
};

struct Harness {
    graph: Arc<MemoryGraphStore>,
    kv: Arc<MemoryKvStore>,
    pipeline: IngestPipeline,
}

fn harness() -> Harness {
    let graph = Arc::new(MemoryGraphStore::new());
    let kv = Arc::new(MemoryKvStore::new());
    let registry = Arc::new(ChecksumRegistry::new(kv.clone()));
    let manager = lore_ingest::ProvenanceManager::new(BatchWriter::new(graph.clone()));
    let pipeline = IngestPipeline::new(registry, StructuralValidator::default(), manager);
    Harness {
        graph,
        kv,
        pipeline,
    }
}

fn concept(id: &str) -> CandidateConcept {
    CandidateConcept {
        description: Some(format!("A longer description of {id}")),
        confidence: Some(0.9),
        bloom_level: Some("APPLY".to_string()),
        difficulty: Some(2),
        ..CandidateConcept::new(id, &id.to_lowercase())
    }
}

fn rel(source: &str, target: &str, kind: &str) -> CandidateRelationship {
    CandidateRelationship::new(source, target, kind)
}

fn chain_batch() -> CandidateBatch {
    CandidateBatch {
        concepts: vec![concept("SETS"), concept("FUNCTIONS"), concept("RELATIONS")],
        relationships: vec![
            rel("FUNCTIONS", "SETS", "REQUIRES"),
            rel("RELATIONS", "SETS", "BUILDS_ON"),
        ],
    }
}

fn request(doc_id: &str, filename: &str, content: &str, batch: CandidateBatch) -> IngestRequest {
    IngestRequest {
        doc_id: doc_id.to_string(),
        filename: filename.to_string(),
        content: content.as_bytes().to_vec(),
        batch,
        force_override: false,
    }
}

// ── Checksum gate ────────────────────────────────────────────────

#[tokio::test]
async fn test_identical_content_is_skipped_without_new_registry_entry() {
    let h = harness();

    let first = h
        .pipeline
        .ingest(request("D1", "sets.md", "v1", chain_batch()))
        .await
        .unwrap();
    assert_eq!(first.status, RegistryStatus::Committed);
    let overwrite = first.overwrite.unwrap();
    assert_eq!(overwrite.snapshots.inserted, 5);

    let kv_writes = h.kv.write_count();
    let graph_writes = h.graph.write_count().await;

    let second = h
        .pipeline
        .ingest(request("D2", "sets.md", "v1", chain_batch()))
        .await
        .unwrap();
    assert_eq!(second.status, RegistryStatus::Skipped);
    assert_eq!(second.doc_id, "D1");
    assert!(second.overwrite.is_none());
    assert_eq!(h.kv.write_count(), kv_writes);
    assert_eq!(h.graph.write_count().await, graph_writes);
    assert!(h.graph.get_document("D2").await.unwrap().is_none());

    let record = h.pipeline.registry().get_by_doc("D1").await.unwrap().unwrap();
    assert_eq!(record.status, RegistryStatus::Committed);
    assert_eq!(record.concept_count, Some(3));
    assert_eq!(record.relationship_count, Some(2));
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn test_edited_content_supersedes_previous_document() {
    let h = harness();
    h.pipeline
        .ingest(request("D1", "sets.md", "v1", chain_batch()))
        .await
        .unwrap();

    let mut edited = chain_batch();
    edited.concepts.pop();
    edited.relationships.pop();
    let outcome = h
        .pipeline
        .ingest(request("D2", "sets.md", "v2", edited))
        .await
        .unwrap();

    let overwrite = outcome.overwrite.unwrap();
    assert!(overwrite.was_overwrite);
    assert_eq!(overwrite.superseded_doc_id.as_deref(), Some("D1"));
    assert!(h.graph.concept("RELATIONS").await.is_none());
    assert_eq!(h.graph.concept_ids().await, vec!["FUNCTIONS", "SETS"]);

    let live: Vec<_> = h
        .graph
        .documents_for("sets.md")
        .await
        .into_iter()
        .filter(|d| d.status.is_active())
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].doc_id, "D2");
}

// ── Validation ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cyclic_batch_is_rejected_before_any_write() {
    let h = harness();
    let batch = CandidateBatch {
        concepts: vec![concept("A"), concept("B"), concept("C")],
        relationships: vec![
            rel("A", "B", "REQUIRES"),
            rel("B", "C", "REQUIRES"),
            rel("C", "A", "PART_OF"),
        ],
    };

    let err = h
        .pipeline
        .ingest(request("D1", "cycle.md", "cyclic", batch))
        .await
        .unwrap_err();
    let verdict = match err {
        IngestError::Validation(verdict) => verdict,
        other => panic!("expected a validation error, got {other}"),
    };
    assert!(!verdict.is_valid);
    assert_eq!(verdict.error_count, 1);
    assert!(verdict.has_rule(Rule::StructuralCycle));

    assert_eq!(h.graph.write_count().await, 0);
    let record = h.pipeline.registry().get_by_doc("D1").await.unwrap().unwrap();
    assert_eq!(record.status, RegistryStatus::Failed);
    assert!(record.error.is_some());
}

#[tokio::test]
async fn test_warnings_travel_with_success() {
    let h = harness();
    let mut batch = chain_batch();
    batch.concepts[0].description = Some("Short".to_string());

    let outcome = h
        .pipeline
        .ingest(request("D1", "sets.md", "v1", batch))
        .await
        .unwrap();

    assert_eq!(outcome.status, RegistryStatus::Committed);
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.rule == Rule::ShortDescription && i.severity == Severity::Warning));
    assert!(outcome.issues.iter().all(|i| i.severity != Severity::Error));
}

#[tokio::test]
async fn test_auto_fix_repairs_ids_and_drops_self_loops() {
    let h = harness();
    let batch = CandidateBatch {
        concepts: vec![concept("intro to sets"), concept("Power Set")],
        relationships: vec![
            rel("Power Set", "intro to sets", "DEPENDS_ON"),
            rel("Power Set", "Power Set", "RELATED_TO"),
        ],
    };

    let outcome = h
        .pipeline
        .ingest(request("D1", "sets.md", "messy", batch))
        .await
        .unwrap();

    assert_eq!(outcome.status, RegistryStatus::Committed);
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.rule == Rule::AutoFix && i.severity == Severity::Info));
    assert_eq!(h.graph.concept_ids().await, vec!["INTRO_TO_SETS", "POWER_SET"]);
    assert!(h
        .graph
        .relationship(&RelKey::new("POWER_SET", "INTRO_TO_SETS", RelKind::Requires))
        .await
        .is_some());
    assert_eq!(h.graph.relationship_count().await, 1);
}

// ── Store failures ───────────────────────────────────────────────

#[tokio::test]
async fn test_store_failure_surfaces_correlation_id_and_retry_converges() {
    let h = harness();
    h.graph.fail_after(1).await;

    let err = h
        .pipeline
        .ingest(request("D1", "sets.md", "v1", chain_batch()))
        .await
        .unwrap_err();
    let correlation_id = match err {
        IngestError::Store { correlation_id, .. } => correlation_id,
        other => panic!("expected a store error, got {other}"),
    };

    let doc = h.graph.get_document("D1").await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Processing);
    let record = h.pipeline.registry().get_by_doc("D1").await.unwrap().unwrap();
    assert_eq!(record.status, RegistryStatus::Failed);
    assert!(record
        .error
        .as_deref()
        .is_some_and(|e| e.contains(&correlation_id.to_string())));

    // FAILED content is not short-circuited, so the same upload goes through.
    h.graph.clear_failures().await;
    let outcome = h
        .pipeline
        .ingest(request("D1", "sets.md", "v1", chain_batch()))
        .await
        .unwrap();
    assert_ne!(outcome.correlation_id, correlation_id);
    let overwrite = outcome.overwrite.unwrap();
    assert!(overwrite.resumed);
    assert_eq!(h.graph.snapshot_count("D1").await, 5);
    assert_eq!(
        h.graph.concept("SETS").await.unwrap().provenance,
        vec!["D1"]
    );
}

#[tokio::test]
async fn test_rebuild_failure_is_retried_not_skipped() {
    let h = harness();
    let mut keep = chain_batch();
    keep.concepts[0].confidence = Some(1.0);
    h.pipeline
        .ingest(request("KEEP", "keep.md", "keep", keep))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut weaker = chain_batch();
    weaker.concepts[0].confidence = Some(0.2);
    weaker.concepts[0].name = Some("weaker sets".to_string());

    // Document save and both snapshot inserts succeed, the rebuild fails.
    h.graph.fail_after(3).await;
    h.pipeline
        .ingest(request("D1", "sets.md", "v1", weaker.clone()))
        .await
        .unwrap_err();
    h.graph.clear_failures().await;
    assert_eq!(
        h.graph.get_document("D1").await.unwrap().unwrap().status,
        DocumentStatus::Processing
    );

    let outcome = h
        .pipeline
        .ingest(request("D1", "sets.md", "v1", weaker))
        .await
        .unwrap();
    assert_eq!(outcome.status, RegistryStatus::Committed);
    assert!(outcome.overwrite.unwrap().resumed);

    let sets = h.graph.concept("SETS").await.unwrap();
    assert_eq!(sets.confidence, 1.0);
    assert_eq!(sets.provenance, vec!["KEEP", "D1"]);
}

#[tokio::test]
async fn test_sweep_marks_registry_failed() {
    let h = harness();
    let registry = Arc::clone(h.pipeline.registry());

    // The document reaches PROCESSING, then the snapshot writes fail.
    h.graph.fail_after(2).await;
    h.pipeline
        .ingest(request("D1", "sets.md", "v1", chain_batch()))
        .await
        .unwrap_err();
    h.graph.clear_failures().await;

    // The pipeline records the failure itself; reset it to simulate a crash.
    registry
        .update_status("D1", RegistryStatus::Processing, Default::default())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let sweep = RecoverySweep::new(
        h.pipeline.manager().clone(),
        h.pipeline.locks().clone(),
        Duration::ZERO,
    )
    .with_registry(registry.clone());
    let report = sweep.run().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(
        h.graph.get_document("D1").await.unwrap().unwrap().status,
        DocumentStatus::Failed
    );
    let record = registry.get_by_doc("D1").await.unwrap().unwrap();
    assert_eq!(record.status, RegistryStatus::Failed);
    assert!(h.graph.concept_ids().await.is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_uploads_of_one_filename_leave_one_live_document() {
    let h = harness();
    let mut other = chain_batch();
    other.concepts[2] = concept("MAPPINGS");
    other.relationships[1] = rel("MAPPINGS", "SETS", "BUILDS_ON");

    let (a, b) = tokio::join!(
        h.pipeline.ingest(request("D1", "sets.md", "v1", chain_batch())),
        h.pipeline.ingest(request("D2", "sets.md", "v2", other)),
    );
    a.unwrap();
    b.unwrap();

    let live: Vec<_> = h
        .graph
        .documents_for("sets.md")
        .await
        .into_iter()
        .filter(|d| d.status == DocumentStatus::Committed)
        .collect();
    assert_eq!(live.len(), 1);

    let winner = &live[0].doc_id;
    let expected = if winner == "D1" { "RELATIONS" } else { "MAPPINGS" };
    let stale = if winner == "D1" { "MAPPINGS" } else { "RELATIONS" };
    assert!(h.graph.concept(expected).await.is_some());
    assert!(h.graph.concept(stale).await.is_none());
    assert_eq!(h.graph.concept_ids().await.len(), 3);
}
