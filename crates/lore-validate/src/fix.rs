//! Best-effort normalisation of a candidate batch.
//!
//! Auto-fix never re-runs cycle detection. A batch with a structural
//! cycle still fails revalidation and needs a human to pick the edge.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use lore_core::{BloomLevel, Dependency, RelKind};

use crate::candidate::{
    CandidateConcept, CandidateRelationship, DEFAULT_CONFIDENCE, DEFAULT_WEIGHT,
};
use crate::issue::{ElementRef, Rule, Severity, ValidationIssue, ValidationResult};

pub const DEFAULT_BLOOM: BloomLevel = BloomLevel::Understand;
pub const DEFAULT_DIFFICULTY: i64 = 3;
pub const DEFAULT_DEPENDENCY: Dependency = Dependency::Moderate;
pub const DIFFICULTY_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// Replacements for relationship kinds outside the closed set.
const KIND_SUGGESTIONS: &[(&str, RelKind)] = &[
    ("PREREQUISITE_OF", RelKind::Requires),
    ("PREREQUISITE", RelKind::Requires),
    ("DEPENDS_ON", RelKind::Requires),
    ("NEEDS", RelKind::Requires),
    ("EXTENDS", RelKind::BuildsOn),
    ("GENERALIZES", RelKind::BuildsOn),
    ("CONTAINS", RelKind::PartOf),
    ("SUBTOPIC_OF", RelKind::PartOf),
    ("COMPONENT_OF", RelKind::PartOf),
    ("INSTANCE_OF", RelKind::ExampleOf),
    ("ILLUSTRATES", RelKind::ExampleOf),
    ("OPPOSITE_OF", RelKind::ContrastsWith),
    ("DIFFERS_FROM", RelKind::ContrastsWith),
    ("USED_IN", RelKind::AppliesTo),
    ("USED_FOR", RelKind::AppliesTo),
];

/// The closest known kind for `raw`; `RELATED_TO` when nothing matches.
pub fn suggest_kind(raw: &str) -> RelKind {
    let normalized = canonicalize_token(raw);
    KIND_SUGGESTIONS
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, kind)| *kind)
        .unwrap_or(RelKind::RelatedTo)
}

/// Concept id grammar.
pub const ID_PATTERN: &str = r"^[A-Z][A-Z0-9_]*$";

fn id_pattern() -> &'static Regex {
    static ID: OnceLock<Regex> = OnceLock::new();
    ID.get_or_init(|| Regex::new(ID_PATTERN).expect("ID_PATTERN is a valid regex"))
}

/// Whether `id` follows the concept id grammar.
pub fn is_valid_id(id: &str) -> bool {
    id_pattern().is_match(id)
}

/// Rewrite an arbitrary label into the id grammar, or `None` when nothing
/// alphanumeric remains.
pub fn canonicalize_id(raw: &str) -> Option<String> {
    let token = canonicalize_token(raw);
    if token.is_empty() {
        return None;
    }
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        return Some(format!("C_{token}"));
    }
    Some(token)
}

/// Uppercase, collapse runs of non-alphanumerics into `_`, trim `_`.
fn canonicalize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

fn clamp_unit(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

/// Output of [`auto_fix`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixOutcome {
    pub concepts: Vec<CandidateConcept>,
    pub relationships: Vec<CandidateRelationship>,
    /// One INFO issue per change made.
    pub changes: Vec<ValidationIssue>,
}

/// Normalise a batch so that it can pass revalidation.
///
/// Canonicalises ids (rewriting relationship endpoints to match), fills or
/// clamps numeric fields, replaces invalid enum values with defaults, and
/// drops concepts with no recoverable id, later duplicates of an id, and
/// relationships left dangling or self-referencing.
pub fn auto_fix(
    concepts: &[CandidateConcept],
    relationships: &[CandidateRelationship],
    result: &ValidationResult,
) -> FixOutcome {
    if result.is_valid && result.warning_count == 0 {
        return FixOutcome {
            concepts: concepts.to_vec(),
            relationships: relationships.to_vec(),
            changes: Vec::new(),
        };
    }

    let mut changes = Vec::new();
    let mut renamed: HashMap<String, String> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut fixed_concepts = Vec::with_capacity(concepts.len());

    for (index, original) in concepts.iter().enumerate() {
        let element = || ElementRef::Concept {
            index,
            id: original.id().map(str::to_string),
        };
        let mut note = |message: String| {
            changes.push(ValidationIssue::new(
                Rule::AutoFix,
                Severity::Info,
                element(),
                message,
            ));
        };

        let raw_id = original.id().or(original.name());
        let Some(id) = raw_id.and_then(canonicalize_id) else {
            note("Dropped concept with no usable id or name".to_string());
            continue;
        };
        if let Some(old) = original.id() {
            if old != id {
                note(format!("Renamed id {old} to {id}"));
                renamed.insert(old.to_string(), id.clone());
            }
        } else {
            note(format!("Derived id {id} from name"));
        }
        if !seen.insert(id.clone()) {
            note(format!("Dropped duplicate of {id}"));
            continue;
        }

        let mut fixed = original.clone();
        fixed.id = Some(id.clone());

        if original.name().is_none() {
            let name = id.to_lowercase().replace('_', " ");
            note(format!("Derived name \"{name}\" from id"));
            fixed.name = Some(name);
        }

        if let Some(raw) = original.bloom_level.as_deref() {
            match BloomLevel::parse(raw) {
                Some(level) => fixed.bloom_level = Some(level.as_str().to_string()),
                None => {
                    note(format!("Bloom level {raw} replaced with {}", DEFAULT_BLOOM.as_str()));
                    fixed.bloom_level = Some(DEFAULT_BLOOM.as_str().to_string());
                }
            }
        }

        let difficulty = original
            .difficulty
            .map(|d| d.clamp(*DIFFICULTY_RANGE.start(), *DIFFICULTY_RANGE.end()))
            .unwrap_or(DEFAULT_DIFFICULTY);
        if original.difficulty != Some(difficulty) {
            note(format!("Difficulty set to {difficulty}"));
            fixed.difficulty = Some(difficulty);
        }

        let confidence = clamp_unit(original.confidence, DEFAULT_CONFIDENCE);
        if original.confidence != Some(confidence) {
            note(format!("Confidence set to {confidence}"));
            fixed.confidence = Some(confidence);
        }

        fixed_concepts.push(fixed);
    }

    let mut fixed_relationships = Vec::with_capacity(relationships.len());
    for (index, original) in relationships.iter().enumerate() {
        let element = || ElementRef::Relationship {
            index,
            source_id: original.source_id().map(str::to_string),
            target_id: original.target_id().map(str::to_string),
        };
        let mut note = |message: String| {
            changes.push(ValidationIssue::new(
                Rule::AutoFix,
                Severity::Info,
                element(),
                message,
            ));
        };

        let resolve = |raw: Option<&str>| {
            raw.and_then(|r| renamed.get(r).cloned().or_else(|| canonicalize_id(r)))
                .filter(|id| seen.contains(id))
        };
        let (Some(source), Some(target)) =
            (resolve(original.source_id()), resolve(original.target_id()))
        else {
            note("Dropped relationship with a missing endpoint".to_string());
            continue;
        };
        if source == target {
            note(format!("Dropped self-loop on {source}"));
            continue;
        }

        let mut fixed = original.clone();
        fixed.source_id = Some(source);
        fixed.target_id = Some(target);

        let kind = match original.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(raw) => RelKind::parse(raw).unwrap_or_else(|| {
                let kind = suggest_kind(raw);
                note(format!("Kind {raw} replaced with {kind}"));
                kind
            }),
            None => {
                note(format!("Missing kind set to {}", RelKind::RelatedTo));
                RelKind::RelatedTo
            }
        };
        fixed.kind = Some(kind.as_str().to_string());

        let weight = clamp_unit(original.weight, DEFAULT_WEIGHT);
        if original.weight.is_some_and(|w| w != weight) {
            note(format!("Weight clamped to {weight}"));
        }
        fixed.weight = Some(weight);

        let confidence = clamp_unit(original.confidence, DEFAULT_CONFIDENCE);
        if original.confidence.is_some_and(|c| c != confidence) {
            note(format!("Confidence clamped to {confidence}"));
        }
        fixed.confidence = Some(confidence);

        if let Some(raw) = original.dependency.as_deref() {
            if Dependency::parse(raw).is_none() {
                note(format!(
                    "Dependency {raw} replaced with {}",
                    DEFAULT_DEPENDENCY.as_str()
                ));
                fixed.dependency = Some(DEFAULT_DEPENDENCY.as_str().to_string());
            }
        }

        fixed_relationships.push(fixed);
    }

    FixOutcome {
        concepts: fixed_concepts,
        relationships: fixed_relationships,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> ValidationResult {
        ValidationResult {
            is_valid: false,
            error_count: 1,
            ..ValidationResult::default()
        }
    }

    #[test]
    fn test_id_pattern_compiles() {
        assert!(Regex::new(ID_PATTERN).is_ok());
        assert!(is_valid_id("POWER_SET"));
        assert!(is_valid_id("A1"));
        assert!(!is_valid_id("power_set"));
        assert!(!is_valid_id("1A"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_canonicalize_id() {
        assert_eq!(canonicalize_id("linear equations").as_deref(), Some("LINEAR_EQUATIONS"));
        assert_eq!(canonicalize_id("  --Ohm's law!! ").as_deref(), Some("OHM_S_LAW"));
        assert_eq!(canonicalize_id("2d-vectors").as_deref(), Some("C_2D_VECTORS"));
        assert_eq!(canonicalize_id("???"), None);
        assert!(is_valid_id("OHM_S_LAW"));
        assert!(!is_valid_id("ohm"));
        assert!(!is_valid_id("_A"));
    }

    #[test]
    fn test_suggest_kind() {
        assert_eq!(suggest_kind("depends on"), RelKind::Requires);
        assert_eq!(suggest_kind("Extends"), RelKind::BuildsOn);
        assert_eq!(suggest_kind("subtopic_of"), RelKind::PartOf);
        assert_eq!(suggest_kind("INSTANCE_OF"), RelKind::ExampleOf);
        assert_eq!(suggest_kind("opposite-of"), RelKind::ContrastsWith);
        assert_eq!(suggest_kind("USED_IN"), RelKind::AppliesTo);
        assert_eq!(suggest_kind("MENTIONS"), RelKind::RelatedTo);
    }

    #[test]
    fn test_fix_renames_ids_and_rewrites_endpoints() {
        let concepts = vec![
            CandidateConcept::new("linear equations", "Linear equations"),
            CandidateConcept::new("SLOPE", "Slope"),
        ];
        let rels = vec![CandidateRelationship::new("linear equations", "SLOPE", "extends")];

        let outcome = auto_fix(&concepts, &rels, &failing());
        assert_eq!(outcome.concepts[0].id.as_deref(), Some("LINEAR_EQUATIONS"));
        assert_eq!(
            outcome.relationships[0].source_id.as_deref(),
            Some("LINEAR_EQUATIONS")
        );
        assert_eq!(outcome.relationships[0].kind.as_deref(), Some("BUILDS_ON"));
        assert!(outcome.changes.iter().all(|c| c.severity == Severity::Info));
    }

    #[test]
    fn test_fix_drops_self_loops_and_dangling_edges() {
        let concepts = vec![CandidateConcept::new("A", "a"), CandidateConcept::new("B", "b")];
        let rels = vec![
            CandidateRelationship::new("A", "A", "REQUIRES"),
            CandidateRelationship::new("A", "GHOST", "REQUIRES"),
            CandidateRelationship::new("A", "B", "REQUIRES"),
        ];
        let outcome = auto_fix(&concepts, &rels, &failing());
        assert_eq!(outcome.relationships.len(), 1);
        assert_eq!(outcome.relationships[0].target_id.as_deref(), Some("B"));
    }

    #[test]
    fn test_fix_coerces_fields() {
        let mut concept = CandidateConcept::new("A", "a");
        concept.bloom_level = Some("memorize".to_string());
        concept.difficulty = Some(9);
        concept.confidence = Some(1.7);
        let mut rel = CandidateRelationship::new("A", "B", "REQUIRES");
        rel.weight = Some(-0.5);
        rel.dependency = Some("CRITICAL".to_string());

        let outcome = auto_fix(
            &[concept, CandidateConcept::new("B", "b")],
            &[rel],
            &failing(),
        );
        let fixed = &outcome.concepts[0];
        assert_eq!(fixed.bloom_level.as_deref(), Some("UNDERSTAND"));
        assert_eq!(fixed.difficulty, Some(5));
        assert_eq!(fixed.confidence, Some(1.0));
        assert_eq!(outcome.concepts[1].difficulty, Some(DEFAULT_DIFFICULTY));
        let rel = &outcome.relationships[0];
        assert_eq!(rel.weight, Some(0.0));
        assert_eq!(rel.dependency.as_deref(), Some("MODERATE"));
    }

    #[test]
    fn test_fix_drops_later_duplicates() {
        let concepts = vec![
            CandidateConcept::new("Fractions", "first"),
            CandidateConcept::new("FRACTIONS", "second"),
        ];
        let outcome = auto_fix(&concepts, &[], &failing());
        assert_eq!(outcome.concepts.len(), 1);
        assert_eq!(outcome.concepts[0].name.as_deref(), Some("first"));
    }

    #[test]
    fn test_clean_batch_untouched() {
        let concepts = vec![CandidateConcept::new("A", "a")];
        let outcome = auto_fix(&concepts, &[], &ValidationResult::from_issues(vec![]));
        assert_eq!(outcome.concepts, concepts);
        assert!(outcome.changes.is_empty());
    }
}
