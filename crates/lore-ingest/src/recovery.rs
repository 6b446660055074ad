//! Recovery sweep for abandoned ingestions.
//!
//! An ingestion that dies between "PROCESSING" and "COMMITTED" leaves the
//! document PROCESSING forever. The sweep finds such documents once they
//! have been idle past the timeout, marks them FAILED, and rebuilds the
//! canonical entities they touched so partial writes stop counting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use lore_core::DocumentStatus;
use lore_registry::{ChecksumRegistry, RegistryError, RegistryStatus, StatusUpdate};

use crate::error::Result;
use crate::locks::FilenameLocks;
use crate::provenance::ProvenanceManager;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    /// PROCESSING documents looked at.
    pub examined: u64,
    /// Documents moved to FAILED.
    pub failed: u64,
    /// Canonical entities rebuilt or removed as a consequence.
    pub rebuilt: u64,
}

pub struct RecoverySweep {
    manager: ProvenanceManager,
    locks: FilenameLocks,
    timeout: Duration,
    registry: Option<Arc<ChecksumRegistry>>,
}

impl RecoverySweep {
    /// `locks` should be the same map the pipeline uses, so a sweep never
    /// races a live ingestion of the same filename.
    pub fn new(manager: ProvenanceManager, locks: FilenameLocks, timeout: Duration) -> Self {
        Self {
            manager,
            locks,
            timeout,
            registry: None,
        }
    }

    /// Also mark swept documents FAILED in the checksum registry, so the
    /// same content is accepted again on the next upload.
    pub fn with_registry(mut self, registry: Arc<ChecksumRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let timeout = TimeDelta::from_std(self.timeout).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(timeout)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let processing = self
            .manager
            .store()
            .documents_with_status(DocumentStatus::Processing)
            .await?;

        let mut report = SweepReport::default();
        for candidate in processing {
            report.examined += 1;
            if candidate.updated_at >= cutoff {
                continue;
            }

            let _guard = self.locks.acquire(&candidate.filename).await;
            // Re-read under the lock; a live ingestion may have finished it.
            let Some(doc) = self.manager.store().get_document(&candidate.doc_id).await? else {
                continue;
            };
            if doc.status != DocumentStatus::Processing || doc.updated_at >= cutoff {
                debug!(doc_id = %doc.doc_id, status = %doc.status, "Document no longer stale");
                continue;
            }

            let summary = self.manager.fail_document(&doc).await?;
            report.failed += 1;
            report.rebuilt += summary.rebuilt + summary.deleted;

            if let Some(registry) = &self.registry {
                let update = StatusUpdate::error(format!(
                    "processing abandoned, idle since {}",
                    doc.updated_at.to_rfc3339()
                ));
                match registry
                    .update_status(&doc.doc_id, RegistryStatus::Failed, update)
                    .await
                {
                    Ok(_) | Err(RegistryError::UnknownDocument { .. }) => {}
                    Err(e) => warn!(doc_id = %doc.doc_id, error = %e, "Registry update failed"),
                }
            }
        }

        info!(
            examined = report.examined,
            failed = report.failed,
            rebuilt = report.rebuilt,
            timeout_secs = self.timeout.as_secs(),
            "Recovery sweep finished"
        );
        Ok(report)
    }
}
