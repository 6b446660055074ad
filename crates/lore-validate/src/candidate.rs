//! Candidate records as produced by extraction, before validation.
//!
//! Every field is optional or loosely typed so that malformed input can be
//! reported rather than rejected at deserialization time.

use serde::{Deserialize, Serialize};

use lore_core::{BloomLevel, Dependency, ExtractedConcept, ExtractedRelationship, RelKind};

use crate::fix::suggest_kind;

pub const DEFAULT_CONFIDENCE: f64 = 1.0;
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateConcept {
    #[serde(default, alias = "concept_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bloom_level: Option<String>,
    #[serde(default)]
    pub difficulty: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl CandidateConcept {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// The id, if present and non-blank.
    pub fn id(&self) -> Option<&str> {
        present(&self.id)
    }

    pub fn name(&self) -> Option<&str> {
        present(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateRelationship {
    #[serde(default, alias = "source")]
    pub source_id: Option<String>,
    #[serde(default, alias = "target")]
    pub target_id: Option<String>,
    #[serde(default, alias = "type", alias = "rel_type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub dependency: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl CandidateRelationship {
    pub fn new(source_id: &str, target_id: &str, kind: &str) -> Self {
        Self {
            source_id: Some(source_id.to_string()),
            target_id: Some(target_id.to_string()),
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        present(&self.source_id)
    }

    pub fn target_id(&self) -> Option<&str> {
        present(&self.target_id)
    }

    /// The kind this relationship will be written as: the declared kind
    /// when recognised, otherwise the suggested replacement.
    pub fn resolved_kind(&self) -> Option<RelKind> {
        let raw = present(&self.kind)?;
        Some(RelKind::parse(raw).unwrap_or_else(|| suggest_kind(raw)))
    }
}

/// One document's full candidate batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateBatch {
    #[serde(default, alias = "nodes")]
    pub concepts: Vec<CandidateConcept>,
    #[serde(default, alias = "edges")]
    pub relationships: Vec<CandidateRelationship>,
}

impl CandidateBatch {
    /// Convert a batch that passed validation into extraction records.
    ///
    /// Fields that only drew warnings (unknown Bloom level, unknown
    /// dependency) are dropped; unknown kinds take their suggested
    /// replacement. Records missing an id or an endpoint are skipped.
    pub fn to_extracted(&self) -> (Vec<ExtractedConcept>, Vec<ExtractedRelationship>) {
        let concepts = self
            .concepts
            .iter()
            .filter_map(|c| {
                let id = c.id()?;
                Some(ExtractedConcept {
                    concept_id: id.to_string(),
                    name: c.name().unwrap_or(id).to_string(),
                    description: c.description.clone().filter(|d| !d.trim().is_empty()),
                    bloom_level: c.bloom_level.as_deref().and_then(BloomLevel::parse),
                    difficulty: c.difficulty.and_then(|d| u8::try_from(d).ok()),
                    tags: c.tags.clone(),
                    confidence: c.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                })
            })
            .collect();

        let relationships = self
            .relationships
            .iter()
            .filter_map(|r| {
                Some(ExtractedRelationship {
                    kind: r.resolved_kind()?,
                    source_id: r.source_id()?.to_string(),
                    target_id: r.target_id()?.to_string(),
                    weight: r.weight.unwrap_or(DEFAULT_WEIGHT),
                    dependency: r.dependency.as_deref().and_then(Dependency::parse),
                    confidence: r.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                })
            })
            .collect();

        (concepts, relationships)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
