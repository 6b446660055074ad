//! lore-validate: structural validation of extracted concept batches.
//!
//! Every candidate batch passes through [`StructuralValidator`] before it
//! touches the graph. Issues are always returned as a structured list;
//! warnings travel with a successful verdict rather than being dropped.

pub mod candidate;
pub mod config;
pub mod cycles;
pub mod fix;
pub mod issue;
mod rules;
pub mod validator;

pub use candidate::{CandidateBatch, CandidateConcept, CandidateRelationship};
pub use config::ValidatorConfig;
pub use fix::{auto_fix, canonicalize_id, suggest_kind, FixOutcome};
pub use issue::{ElementRef, Rule, Severity, ValidationIssue, ValidationResult};
pub use validator::StructuralValidator;
