//! The structural validator.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::candidate::{CandidateBatch, CandidateConcept, CandidateRelationship};
use crate::config::ValidatorConfig;
use crate::fix::{auto_fix, FixOutcome};
use crate::issue::ValidationResult;
use crate::rules::{check_concepts, check_cycles, check_orphans, check_relationships, Report};

/// Decides whether one document's candidate batch may be committed.
///
/// Pure: no I/O and no state beyond configuration.
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator {
    config: ValidatorConfig,
}

impl StructuralValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run every rule and return the verdict.
    ///
    /// Concept rules run first in a fixed order, then relationship rules,
    /// then the orphan and structural-cycle checks over the whole batch.
    pub fn validate(
        &self,
        concepts: &[CandidateConcept],
        relationships: &[CandidateRelationship],
    ) -> ValidationResult {
        let mut report = Report::new(&self.config);

        check_concepts(concepts, &mut report);
        let known_ids: HashSet<&str> = concepts.iter().filter_map(|c| c.id()).collect();
        check_relationships(relationships, &known_ids, &mut report);
        check_orphans(concepts, relationships, &mut report);
        check_cycles(relationships, &mut report);

        let result = ValidationResult::from_issues(report.issues);
        debug!(
            concepts = concepts.len(),
            relationships = relationships.len(),
            errors = result.error_count,
            warnings = result.warning_count,
            "Batch validated"
        );
        result
    }

    pub fn validate_batch(&self, batch: &CandidateBatch) -> ValidationResult {
        self.validate(&batch.concepts, &batch.relationships)
    }

    /// Normalise a batch after a failed or noisy validation.
    pub fn auto_fix(
        &self,
        concepts: &[CandidateConcept],
        relationships: &[CandidateRelationship],
        result: &ValidationResult,
    ) -> FixOutcome {
        let outcome = auto_fix(concepts, relationships, result);
        if !outcome.changes.is_empty() {
            warn!(
                changes = outcome.changes.len(),
                concepts_dropped = concepts.len() - outcome.concepts.len(),
                relationships_dropped = relationships.len() - outcome.relationships.len(),
                "Auto-fix applied"
            );
        }
        outcome
    }

    /// Validate, and when the batch fails and auto-fix is enabled, fix and
    /// validate again. Returns the batch that was finally judged together
    /// with its verdict; auto-fix changes are included as INFO issues.
    pub fn validate_with_fix(&self, batch: &CandidateBatch) -> (CandidateBatch, ValidationResult) {
        let first = self.validate_batch(batch);
        if first.is_valid || !self.config.auto_fix {
            return (batch.clone(), first);
        }

        let outcome = self.auto_fix(&batch.concepts, &batch.relationships, &first);
        let fixed = CandidateBatch {
            concepts: outcome.concepts,
            relationships: outcome.relationships,
        };
        let mut second = self.validate_batch(&fixed);
        second.issues.extend(outcome.changes);
        (fixed, second)
    }
}
