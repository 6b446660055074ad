//! Validation issues and the aggregate verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rule that produced an issue. Names are stable and are what
/// `validator.strict_rules` refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    MissingField,
    IdFormat,
    DuplicateId,
    BloomLevel,
    DifficultyRange,
    ConfidenceRange,
    WeightRange,
    ShortDescription,
    MissingEndpoint,
    SelfLoop,
    UnknownKind,
    InvalidDependency,
    Orphan,
    StructuralCycle,
    AutoFix,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::IdFormat => "id_format",
            Self::DuplicateId => "duplicate_id",
            Self::BloomLevel => "bloom_level",
            Self::DifficultyRange => "difficulty_range",
            Self::ConfidenceRange => "confidence_range",
            Self::WeightRange => "weight_range",
            Self::ShortDescription => "short_description",
            Self::MissingEndpoint => "missing_endpoint",
            Self::SelfLoop => "self_loop",
            Self::UnknownKind => "unknown_kind",
            Self::InvalidDependency => "invalid_dependency",
            Self::Orphan => "orphan",
            Self::StructuralCycle => "structural_cycle",
            Self::AutoFix => "auto_fix",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The element an issue is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum ElementRef {
    Concept {
        index: usize,
        id: Option<String>,
    },
    Relationship {
        index: usize,
        source_id: Option<String>,
        target_id: Option<String>,
    },
    Batch,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concept { index, id } => match id {
                Some(id) => write!(f, "concept[{index}] {id}"),
                None => write!(f, "concept[{index}]"),
            },
            Self::Relationship {
                index,
                source_id,
                target_id,
            } => write!(
                f,
                "relationship[{index}] {} -> {}",
                source_id.as_deref().unwrap_or("?"),
                target_id.as_deref().unwrap_or("?")
            ),
            Self::Batch => f.write_str("batch"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub rule: Rule,
    pub severity: Severity,
    #[serde(flatten)]
    pub element: ElementRef,
    pub message: String,
    /// Replacement value proposed by the rule, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(rule: Rule, severity: Severity, element: ElementRef, message: String) -> Self {
        Self {
            rule,
            severity,
            element,
            message,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.severity, self.rule, self.element, self.message)
    }
}

/// Verdict for one candidate batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let error_count = count(&issues, Severity::Error);
        let warning_count = count(&issues, Severity::Warning);
        Self {
            is_valid: error_count == 0,
            error_count,
            warning_count,
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(Severity::Warning)
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn has_rule(&self, rule: Rule) -> bool {
        self.issues.iter().any(|i| i.rule == rule)
    }
}

fn count(issues: &[ValidationIssue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_counts() {
        let issues = vec![
            ValidationIssue::new(
                Rule::Orphan,
                Severity::Warning,
                ElementRef::Concept {
                    index: 0,
                    id: Some("A".to_string()),
                },
                "no relationships".to_string(),
            ),
            ValidationIssue::new(
                Rule::SelfLoop,
                Severity::Error,
                ElementRef::Relationship {
                    index: 0,
                    source_id: Some("A".to_string()),
                    target_id: Some("A".to_string()),
                },
                "self loop".to_string(),
            ),
        ];
        let result = ValidationResult::from_issues(issues);
        assert!(!result.is_valid);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ValidationIssue::new(
            Rule::UnknownKind,
            Severity::Warning,
            ElementRef::Relationship {
                index: 2,
                source_id: Some("A".to_string()),
                target_id: Some("B".to_string()),
            },
            "unknown kind EXTENDS".to_string(),
        )
        .with_suggestion("BUILDS_ON");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["rule"], "unknown_kind");
        assert_eq!(json["severity"], "WARNING");
        assert_eq!(json["element"], "relationship");
        assert_eq!(json["index"], 2);
        assert_eq!(json["suggestion"], "BUILDS_ON");
    }
}
