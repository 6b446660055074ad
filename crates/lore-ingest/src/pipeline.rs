//! End-to-end ingestion of one document's candidate batch.
//!
//! ```text
//! register ─► PROCESSING ─► validate (+ auto-fix) ─► VALIDATED
//!    │                         │
//!    └─ SKIPPED                └─ FAILED (ValidationError)
//!
//! VALIDATED ─► filename lock ─► overwrite_document ─► COMMITTED
//!                                   │
//!                                   └─ FAILED (StoreError + correlation id)
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use lore_registry::{ChecksumRegistry, RegistryStatus, StatusUpdate};
use lore_validate::{CandidateBatch, Severity, StructuralValidator, ValidationIssue};

use crate::error::{IngestError, Result};
use crate::locks::FilenameLocks;
use crate::provenance::{OverwriteResult, OverwriteStatus, ProvenanceManager};

/// One document submitted for ingestion.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub doc_id: String,
    pub filename: String,
    /// Raw document bytes; only fingerprinted, never parsed.
    pub content: Vec<u8>,
    pub batch: CandidateBatch,
    pub force_override: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub correlation_id: Uuid,
    /// The document the outcome refers to. For a skip this is the document
    /// that originally ingested the content.
    pub doc_id: String,
    /// SKIPPED or COMMITTED.
    pub status: RegistryStatus,
    pub overwrite: Option<OverwriteResult>,
    /// Warnings and auto-fix notes that accompanied a successful verdict.
    pub issues: Vec<ValidationIssue>,
}

pub struct IngestPipeline {
    registry: Arc<ChecksumRegistry>,
    validator: StructuralValidator,
    manager: ProvenanceManager,
    locks: FilenameLocks,
}

impl IngestPipeline {
    pub fn new(
        registry: Arc<ChecksumRegistry>,
        validator: StructuralValidator,
        manager: ProvenanceManager,
    ) -> Self {
        Self {
            registry,
            validator,
            manager,
            locks: FilenameLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ChecksumRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &ProvenanceManager {
        &self.manager
    }

    /// The lock map guarding overwrites; share it with a recovery sweep.
    pub fn locks(&self) -> &FilenameLocks {
        &self.locks
    }

    /// Run one ingestion under a fresh correlation id.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "ingest",
            %correlation_id,
            doc_id = %request.doc_id,
            filename = %request.filename,
        );
        self.run(request, correlation_id).instrument(span).await
    }

    async fn run(&self, request: IngestRequest, correlation_id: Uuid) -> Result<IngestOutcome> {
        let IngestRequest {
            doc_id,
            filename,
            content,
            batch,
            force_override,
        } = request;

        let record = self
            .registry
            .register(&doc_id, &filename, &content, force_override)
            .await?;
        if record.status == RegistryStatus::Skipped {
            return Ok(IngestOutcome {
                correlation_id,
                doc_id: record.doc_id,
                status: RegistryStatus::Skipped,
                overwrite: None,
                issues: Vec::new(),
            });
        }

        self.registry
            .update_status(&doc_id, RegistryStatus::Processing, StatusUpdate::default())
            .await?;

        let (batch, verdict) = self.validator.validate_with_fix(&batch);
        if !verdict.is_valid {
            warn!(
                errors = verdict.error_count,
                warnings = verdict.warning_count,
                "Batch rejected by validation"
            );
            self.registry
                .update_status(
                    &doc_id,
                    RegistryStatus::Failed,
                    StatusUpdate::error(format!(
                        "validation failed with {} errors",
                        verdict.error_count
                    )),
                )
                .await?;
            return Err(IngestError::Validation(verdict));
        }
        if verdict.warning_count > 0 {
            warn!(warnings = verdict.warning_count, "Batch accepted with warnings");
        }

        let (concepts, relationships) = batch.to_extracted();
        self.registry
            .update_status(
                &doc_id,
                RegistryStatus::Validated,
                StatusUpdate::counts(concepts.len(), relationships.len()),
            )
            .await?;

        let overwrite = {
            let _guard = self.locks.acquire(&filename).await;
            self.manager
                .overwrite_document(&doc_id, &filename, &record.checksum, &concepts, &relationships)
                .await
        };

        let overwrite = match overwrite {
            Ok(result) => result,
            Err(source) => {
                error!(error = %source, "Graph write failed, document left PROCESSING");
                let update = StatusUpdate::error(format!("{source} [correlation_id={correlation_id}]"));
                if let Err(e) = self
                    .registry
                    .update_status(&doc_id, RegistryStatus::Failed, update)
                    .await
                {
                    warn!(error = %e, "Could not record failure in registry");
                }
                return Err(IngestError::Store {
                    correlation_id,
                    source,
                });
            }
        };

        self.registry
            .update_status(
                &doc_id,
                RegistryStatus::Committed,
                StatusUpdate::counts(concepts.len(), relationships.len()),
            )
            .await?;

        let status = match overwrite.status {
            OverwriteStatus::Committed => RegistryStatus::Committed,
            OverwriteStatus::Skipped => RegistryStatus::Skipped,
        };
        info!(
            status = %status,
            concepts = concepts.len(),
            relationships = relationships.len(),
            "Ingestion finished"
        );

        Ok(IngestOutcome {
            correlation_id,
            doc_id: overwrite.doc_id.clone(),
            status,
            overwrite: Some(overwrite),
            issues: verdict
                .issues
                .into_iter()
                .filter(|i| i.severity != Severity::Error)
                .collect(),
        })
    }
}
