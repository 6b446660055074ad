//! Registry records and their lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ingestion status tracked by the registry.
///
/// Wider than the graph-side document status: `Validated` marks a batch
/// that passed validation but has not been written yet, and `Skipped` is
/// only ever returned to callers, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryStatus {
    Pending,
    Processing,
    Validated,
    Committed,
    Failed,
    Skipped,
}

impl RegistryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Validated => "VALIDATED",
            Self::Committed => "COMMITTED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Statuses that make a repeat registration of the same content a no-op.
    pub fn short_circuits(&self) -> bool {
        matches!(self, Self::Committed | Self::Validated)
    }
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registration of one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionRecord {
    pub doc_id: String,
    pub filename: String,
    /// BLAKE3 fingerprint of the raw content.
    pub checksum: String,
    pub status: RegistryStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub concept_count: Option<usize>,
    #[serde(default)]
    pub relationship_count: Option<usize>,
}

impl IngestionRecord {
    pub fn new(doc_id: &str, filename: &str, checksum: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            checksum: checksum.to_string(),
            status: RegistryStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            concept_count: None,
            relationship_count: None,
        }
    }

    /// Move to `status`, stamping lifecycle timestamps and applying `update`.
    pub fn transition(&mut self, status: RegistryStatus, update: StatusUpdate) {
        let now = Utc::now();
        match status {
            RegistryStatus::Processing => self.started_at = Some(now),
            RegistryStatus::Committed | RegistryStatus::Failed => self.completed_at = Some(now),
            _ => {}
        }
        self.status = status;
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.concept_count.is_some() {
            self.concept_count = update.concept_count;
        }
        if update.relationship_count.is_some() {
            self.relationship_count = update.relationship_count;
        }
    }
}

/// Optional fields carried alongside a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub error: Option<String>,
    pub concept_count: Option<usize>,
    pub relationship_count: Option<usize>,
}

impl StatusUpdate {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn counts(concepts: usize, relationships: usize) -> Self {
        Self {
            concept_count: Some(concepts),
            relationship_count: Some(relationships),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RegistryStatus::Validated).unwrap();
        assert_eq!(json, "\"VALIDATED\"");
        assert!(RegistryStatus::Committed.short_circuits());
        assert!(!RegistryStatus::Failed.short_circuits());
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let mut record = IngestionRecord::new("d1", "intro.md", "abc");
        assert!(record.started_at.is_none());

        record.transition(RegistryStatus::Processing, StatusUpdate::default());
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_none());

        record.transition(RegistryStatus::Failed, StatusUpdate::error("boom"));
        assert!(record.completed_at.is_some());
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
