//! Core domain types for the Lore knowledge graph.
//!
//! Three layers of data live in the graph:
//! - `SourceDocument`: one uploaded file and its ingestion lifecycle
//! - snapshots: immutable per-document extractions of concepts and relationships
//! - canonical entities: the single current truth per concept id or per
//!   (source, target, kind), derived from snapshots of committed documents

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoreError;

// ── Documents ─────────────────────────────────────────────────────

/// Lifecycle state of a source document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Committed,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Committed => "COMMITTED",
            Self::Failed => "FAILED",
            Self::Deleted => "DELETED",
        }
    }

    /// Whether the document still counts as the live version of its filename.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Deleted)
    }

    /// Allowed lifecycle edges.
    ///
    /// PROCESSING and FAILED may re-enter PROCESSING when an interrupted
    /// ingestion is resumed. Any live document may be superseded.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Failed, Processing)
                | (Processing, Committed)
                | (Processing, Failed)
                | (Pending, Deleted)
                | (Processing, Deleted)
                | (Committed, Deleted)
                | (Failed, Deleted)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMMITTED" => Ok(Self::Committed),
            "FAILED" => Ok(Self::Failed),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(LoreError::InvalidValue {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// An uploaded document, identified by (filename, checksum).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    pub doc_id: String,
    pub filename: String,
    /// BLAKE3 hex fingerprint of the raw content.
    pub checksum: String,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    /// Last lifecycle transition; the recovery sweep keys off this.
    pub updated_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn new(doc_id: &str, filename: &str, checksum: &str) -> Self {
        let now = Utc::now();
        Self {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            checksum: checksum.to_string(),
            status: DocumentStatus::Pending,
            uploaded_at: now,
            updated_at: now,
        }
    }
}

// ── Enums ─────────────────────────────────────────────────────────

/// Bloom's taxonomy level of a concept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    pub const ALL: [BloomLevel; 6] = [
        Self::Remember,
        Self::Understand,
        Self::Apply,
        Self::Analyze,
        Self::Evaluate,
        Self::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remember => "REMEMBER",
            Self::Understand => "UNDERSTAND",
            Self::Apply => "APPLY",
            Self::Analyze => "ANALYZE",
            Self::Evaluate => "EVALUATE",
            Self::Create => "CREATE",
        }
    }

    /// Case-insensitive lookup; returns `None` outside the taxonomy.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|level| level.as_str() == upper)
    }
}

/// Strength of a prerequisite dependency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dependency {
    Strong,
    Moderate,
    Weak,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [Self::Strong, Self::Moderate, Self::Weak];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "STRONG",
            Self::Moderate => "MODERATE",
            Self::Weak => "WEAK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|dep| dep.as_str() == upper)
    }
}

/// The kind of relationship between two concepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelKind {
    Requires,
    BuildsOn,
    PartOf,
    RelatedTo,
    ExampleOf,
    ContrastsWith,
    AppliesTo,
}

impl RelKind {
    pub const ALL: [RelKind; 7] = [
        Self::Requires,
        Self::BuildsOn,
        Self::PartOf,
        Self::RelatedTo,
        Self::ExampleOf,
        Self::ContrastsWith,
        Self::AppliesTo,
    ];

    /// Cypher relationship type for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requires => "REQUIRES",
            Self::BuildsOn => "BUILDS_ON",
            Self::PartOf => "PART_OF",
            Self::RelatedTo => "RELATED_TO",
            Self::ExampleOf => "EXAMPLE_OF",
            Self::ContrastsWith => "CONTRASTS_WITH",
            Self::AppliesTo => "APPLIES_TO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == upper)
    }

    /// Structural kinds carry ordering semantics and must stay acyclic.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Requires | Self::BuildsOn | Self::PartOf)
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Extractions ───────────────────────────────────────────────────

/// A validated concept extracted from one document, before it is bound
/// to a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedConcept {
    pub concept_id: String,
    pub name: String,
    pub description: Option<String>,
    pub bloom_level: Option<BloomLevel>,
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub confidence: f64,
}

/// A validated relationship extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRelationship {
    pub kind: RelKind,
    pub source_id: String,
    pub target_id: String,
    pub weight: f64,
    pub dependency: Option<Dependency>,
    pub confidence: f64,
}

impl ExtractedRelationship {
    pub fn key(&self) -> RelKey {
        RelKey::new(&self.source_id, &self.target_id, self.kind)
    }
}

// ── Snapshots ─────────────────────────────────────────────────────

/// Identity of a canonical relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelKey {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelKind,
}

impl RelKey {
    pub fn new(source_id: &str, target_id: &str, kind: RelKind) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind,
        }
    }
}

impl fmt::Display for RelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source_id, self.kind, self.target_id)
    }
}

/// Immutable record of one concept as extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptSnapshot {
    pub snapshot_id: Uuid,
    pub doc_id: String,
    pub concept_id: String,
    pub name: String,
    pub description: Option<String>,
    pub bloom_level: Option<BloomLevel>,
    pub difficulty: Option<u8>,
    pub tags: Vec<String>,
    pub confidence: f64,
}

impl ConceptSnapshot {
    pub fn from_extracted(doc_id: &str, concept: ExtractedConcept) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            doc_id: doc_id.to_string(),
            concept_id: concept.concept_id,
            name: concept.name,
            description: concept.description,
            bloom_level: concept.bloom_level,
            difficulty: concept.difficulty,
            tags: concept.tags,
            confidence: concept.confidence,
        }
    }
}

/// Immutable record of one relationship as extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelSnapshot {
    pub snapshot_id: Uuid,
    pub doc_id: String,
    pub rel_type: RelKind,
    pub source_id: String,
    pub target_id: String,
    pub weight: f64,
    pub dependency: Option<Dependency>,
    pub confidence: f64,
}

impl RelSnapshot {
    pub fn from_extracted(doc_id: &str, rel: ExtractedRelationship) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            doc_id: doc_id.to_string(),
            rel_type: rel.kind,
            source_id: rel.source_id,
            target_id: rel.target_id,
            weight: rel.weight,
            dependency: rel.dependency,
            confidence: rel.confidence,
        }
    }

    pub fn key(&self) -> RelKey {
        RelKey::new(&self.source_id, &self.target_id, self.rel_type)
    }
}

// ── Canonical Entities ────────────────────────────────────────────

/// The current truth for one concept id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalConcept {
    pub concept_id: String,
    pub name: String,
    pub description: Option<String>,
    pub bloom_level: Option<BloomLevel>,
    pub difficulty: Option<u8>,
    pub tags: Vec<String>,
    pub confidence: f64,
    /// Documents that contributed this concept, in contribution order.
    pub provenance: Vec<String>,
}

impl CanonicalConcept {
    /// Build a canonical concept straight from an extraction.
    pub fn from_extracted(concept: &ExtractedConcept, doc_id: &str) -> Self {
        Self {
            concept_id: concept.concept_id.clone(),
            name: concept.name.clone(),
            description: concept.description.clone(),
            bloom_level: concept.bloom_level,
            difficulty: concept.difficulty,
            tags: concept.tags.clone(),
            confidence: concept.confidence,
            provenance: vec![doc_id.to_string()],
        }
    }
}

/// The current truth for one (source, target, kind) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalRelationship {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelKind,
    pub weight: f64,
    pub dependency: Option<Dependency>,
    pub confidence: f64,
    pub provenance: Vec<String>,
}

impl CanonicalRelationship {
    pub fn from_extracted(rel: &ExtractedRelationship, doc_id: &str) -> Self {
        Self {
            source_id: rel.source_id.clone(),
            target_id: rel.target_id.clone(),
            kind: rel.kind,
            weight: rel.weight,
            dependency: rel.dependency,
            confidence: rel.confidence,
            provenance: vec![doc_id.to_string()],
        }
    }

    pub fn key(&self) -> RelKey {
        RelKey::new(&self.source_id, &self.target_id, self.kind)
    }
}

/// Append `doc_id` to a provenance list unless already present.
/// Returns whether the list changed.
pub fn append_provenance(provenance: &mut Vec<String>, doc_id: &str) -> bool {
    if provenance.iter().any(|d| d == doc_id) {
        return false;
    }
    provenance.push(doc_id.to_string());
    true
}

/// Remove `doc_id` from a provenance list. Returns whether the list changed.
pub fn strip_provenance(provenance: &mut Vec<String>, doc_id: &str) -> bool {
    let before = provenance.len();
    provenance.retain(|d| d != doc_id);
    provenance.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enums_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&RelKind::BuildsOn).unwrap(),
            "\"BUILDS_ON\""
        );
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Committed).unwrap(),
            "\"COMMITTED\""
        );
        assert_eq!(
            serde_json::to_string(&BloomLevel::Analyze).unwrap(),
            "\"ANALYZE\""
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(BloomLevel::parse(" apply "), Some(BloomLevel::Apply));
        assert_eq!(RelKind::parse("part_of"), Some(RelKind::PartOf));
        assert_eq!(Dependency::parse("Weak"), Some(Dependency::Weak));
        assert_eq!(RelKind::parse("DEPENDS_ON"), None);
        assert_eq!(
            "committed".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Committed
        );
        assert!("ARCHIVED".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_structural_kinds() {
        let structural: Vec<_> = RelKind::ALL
            .into_iter()
            .filter(RelKind::is_structural)
            .collect();
        assert_eq!(
            structural,
            vec![RelKind::Requires, RelKind::BuildsOn, RelKind::PartOf]
        );
    }

    #[test]
    fn test_lifecycle_transitions() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Committed));
        assert!(Committed.can_transition_to(Deleted));
        assert!(Failed.can_transition_to(Processing));
        assert!(!Committed.can_transition_to(Processing));
        assert!(!Deleted.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Committed));
    }

    #[test]
    fn test_provenance_append_is_idempotent() {
        let mut provenance = Vec::new();
        assert!(append_provenance(&mut provenance, "d1"));
        assert!(append_provenance(&mut provenance, "d2"));
        assert!(!append_provenance(&mut provenance, "d1"));
        assert_eq!(provenance, vec!["d1", "d2"]);

        assert!(strip_provenance(&mut provenance, "d1"));
        assert!(!strip_provenance(&mut provenance, "d1"));
        assert_eq!(provenance, vec!["d2"]);
    }

    #[test]
    fn test_snapshots_get_fresh_ids() {
        let concept = ExtractedConcept {
            concept_id: "LINEAR_ALGEBRA".to_string(),
            name: "Linear algebra".to_string(),
            description: None,
            bloom_level: Some(BloomLevel::Understand),
            difficulty: Some(3),
            tags: vec![],
            confidence: 0.8,
        };
        let a = ConceptSnapshot::from_extracted("d1", concept.clone());
        let b = ConceptSnapshot::from_extracted("d1", concept);
        assert_ne!(a.snapshot_id, b.snapshot_id);
        assert_eq!(a.concept_id, b.concept_id);
    }
}
