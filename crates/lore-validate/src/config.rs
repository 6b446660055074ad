//! Validator configuration (`[validator]` section).

use serde::Deserialize;

use crate::issue::Rule;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Promote the warnings named in `strict_rules` to errors.
    pub strict: bool,
    pub strict_rules: Vec<Rule>,
    /// Descriptions shorter than this draw a warning.
    pub min_description_len: usize,
    /// Attempt auto-fix when a batch fails validation.
    pub auto_fix: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict: false,
            strict_rules: vec![Rule::IdFormat],
            min_description_len: 10,
            auto_fix: true,
        }
    }
}

impl ValidatorConfig {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub(crate) fn promotes(&self, rule: Rule) -> bool {
        self.strict && self.strict_rules.contains(&rule)
    }
}
