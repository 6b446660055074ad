//! Per-element and graph-level rules.

use std::collections::{HashMap, HashSet};

use lore_core::{BloomLevel, Dependency, RelKind};

use crate::candidate::{CandidateConcept, CandidateRelationship};
use crate::config::ValidatorConfig;
use crate::cycles::find_structural_cycles;
use crate::fix::{is_valid_id, suggest_kind, DIFFICULTY_RANGE};
use crate::issue::{ElementRef, Rule, Severity, ValidationIssue};

/// Collects issues, applying strict-mode promotion as they are raised.
pub(crate) struct Report<'a> {
    config: &'a ValidatorConfig,
    pub(crate) issues: Vec<ValidationIssue>,
}

impl<'a> Report<'a> {
    pub(crate) fn new(config: &'a ValidatorConfig) -> Self {
        Self {
            config,
            issues: Vec::new(),
        }
    }

    fn raise(&mut self, rule: Rule, severity: Severity, element: ElementRef, message: String) {
        self.push(ValidationIssue::new(rule, severity, element, message));
    }

    fn push(&mut self, mut issue: ValidationIssue) {
        if issue.severity == Severity::Warning && self.config.promotes(issue.rule) {
            issue.severity = Severity::Error;
        }
        self.issues.push(issue);
    }
}

fn concept_ref(index: usize, concept: &CandidateConcept) -> ElementRef {
    ElementRef::Concept {
        index,
        id: concept.id().map(str::to_string),
    }
}

fn relationship_ref(index: usize, rel: &CandidateRelationship) -> ElementRef {
    ElementRef::Relationship {
        index,
        source_id: rel.source_id().map(str::to_string),
        target_id: rel.target_id().map(str::to_string),
    }
}

fn unit_range(value: Option<f64>) -> bool {
    value.map_or(true, |v| (0.0..=1.0).contains(&v))
}

// ── Concepts ─────────────────────────────────────────────────────

pub(crate) fn check_concepts(concepts: &[CandidateConcept], report: &mut Report<'_>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let min_description = report.config.min_description_len;

    for (index, concept) in concepts.iter().enumerate() {
        let element = || concept_ref(index, concept);

        let id = concept.id();
        if id.is_none() {
            report.raise(
                Rule::MissingField,
                Severity::Error,
                element(),
                "Missing required field: id".to_string(),
            );
        }
        if concept.name().is_none() {
            report.raise(
                Rule::MissingField,
                Severity::Error,
                element(),
                "Missing required field: name".to_string(),
            );
        }

        if let Some(id) = id {
            if !is_valid_id(id) {
                report.raise(
                    Rule::IdFormat,
                    Severity::Warning,
                    element(),
                    format!("Id {id} does not match [A-Z][A-Z0-9_]*"),
                );
            }
            if let Some(first) = seen.insert(id, index) {
                seen.insert(id, first);
                report.raise(
                    Rule::DuplicateId,
                    Severity::Error,
                    element(),
                    format!("Duplicate id {id}, first defined at concept[{first}]"),
                );
            }
        }

        if let Some(raw) = concept.bloom_level.as_deref() {
            if BloomLevel::parse(raw).is_none() {
                report.raise(
                    Rule::BloomLevel,
                    Severity::Warning,
                    element(),
                    format!("Unknown Bloom level {raw}"),
                );
            }
        }

        if let Some(difficulty) = concept.difficulty {
            if !DIFFICULTY_RANGE.contains(&difficulty) {
                report.raise(
                    Rule::DifficultyRange,
                    Severity::Error,
                    element(),
                    format!("Difficulty {difficulty} outside [1, 5]"),
                );
            }
        }

        if !unit_range(concept.confidence) {
            report.raise(
                Rule::ConfidenceRange,
                Severity::Error,
                element(),
                format!("Confidence {:?} outside [0, 1]", concept.confidence),
            );
        }

        let description_len = concept
            .description
            .as_deref()
            .map_or(0, |d| d.trim().chars().count());
        if description_len < min_description {
            report.raise(
                Rule::ShortDescription,
                Severity::Warning,
                element(),
                format!("Description has {description_len} characters, expected at least {min_description}"),
            );
        }
    }
}

// ── Relationships ────────────────────────────────────────────────

pub(crate) fn check_relationships(
    relationships: &[CandidateRelationship],
    known_ids: &HashSet<&str>,
    report: &mut Report<'_>,
) {
    for (index, rel) in relationships.iter().enumerate() {
        let element = || relationship_ref(index, rel);

        for (label, endpoint) in [("source", rel.source_id()), ("target", rel.target_id())] {
            match endpoint {
                None => report.raise(
                    Rule::MissingField,
                    Severity::Error,
                    element(),
                    format!("Missing required field: {label}_id"),
                ),
                Some(id) if !known_ids.contains(id) => report.raise(
                    Rule::MissingEndpoint,
                    Severity::Error,
                    element(),
                    format!("{label} {id} is not a concept in this batch"),
                ),
                Some(_) => {}
            }
        }

        if let (Some(source), Some(target)) = (rel.source_id(), rel.target_id()) {
            if source == target {
                report.raise(
                    Rule::SelfLoop,
                    Severity::Error,
                    element(),
                    format!("Relationship from {source} to itself"),
                );
            }
        }

        match rel.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            None => report.raise(
                Rule::MissingField,
                Severity::Error,
                element(),
                "Missing required field: type".to_string(),
            ),
            Some(raw) if RelKind::parse(raw).is_none() => {
                let suggestion = suggest_kind(raw);
                report.push(
                    ValidationIssue::new(
                        Rule::UnknownKind,
                        Severity::Warning,
                        element(),
                        format!("Unknown relationship type {raw}, did you mean {suggestion}?"),
                    )
                    .with_suggestion(suggestion.as_str()),
                );
            }
            Some(_) => {}
        }

        if !unit_range(rel.weight) {
            report.raise(
                Rule::WeightRange,
                Severity::Error,
                element(),
                format!("Weight {:?} outside [0, 1]", rel.weight),
            );
        }
        if !unit_range(rel.confidence) {
            report.raise(
                Rule::ConfidenceRange,
                Severity::Error,
                element(),
                format!("Confidence {:?} outside [0, 1]", rel.confidence),
            );
        }

        if let Some(raw) = rel.dependency.as_deref() {
            if Dependency::parse(raw).is_none() {
                report.raise(
                    Rule::InvalidDependency,
                    Severity::Warning,
                    element(),
                    format!("Unknown dependency {raw}, expected STRONG, MODERATE or WEAK"),
                );
            }
        }
    }
}

// ── Graph ────────────────────────────────────────────────────────

/// Concepts with no incident relationship. Skipped for batches of one.
pub(crate) fn check_orphans(
    concepts: &[CandidateConcept],
    relationships: &[CandidateRelationship],
    report: &mut Report<'_>,
) {
    if concepts.len() <= 1 {
        return;
    }
    let connected: HashSet<&str> = relationships
        .iter()
        .flat_map(|r| [r.source_id(), r.target_id()])
        .flatten()
        .collect();

    for (index, concept) in concepts.iter().enumerate() {
        let Some(id) = concept.id() else { continue };
        if !connected.contains(id) {
            report.raise(
                Rule::Orphan,
                Severity::Warning,
                concept_ref(index, concept),
                format!("Concept {id} has no relationships"),
            );
        }
    }
}

pub(crate) fn check_cycles(relationships: &[CandidateRelationship], report: &mut Report<'_>) {
    for cycle in find_structural_cycles(relationships) {
        let rel = &relationships[cycle.edge_index];
        report.raise(
            Rule::StructuralCycle,
            Severity::Error,
            relationship_ref(cycle.edge_index, rel),
            format!("Structural cycle: {}", cycle.path.join(" -> ")),
        );
    }
}
