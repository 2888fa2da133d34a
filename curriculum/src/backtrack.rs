//! Backtrack rules - which prerequisites to review after an error.
//!
//! Static data authored alongside the catalog, keyed by (skill, severity).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Severity tier of a learner's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Careless slip - same skill, minor review
    L1,
    /// Conceptual gap within the skill
    L2,
    /// Missing prerequisite understanding
    L3,
}

/// A rule mapping (skill, error severity) to earlier skills worth reviewing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktrackRule {
    /// Skill the error occurred on
    pub skill_id: String,
    /// Severity this rule applies to
    pub severity: ErrorSeverity,
    /// Ordered prerequisite skill ids to revisit
    pub backtrack_to: Vec<String>,
    /// Message shown to the learner
    pub message: String,
}

/// Lookup table of backtrack rules.
///
/// Missing entries are expected - not every skill has authored rules -
/// so lookups return `Option` rather than an error.
pub struct BacktrackRules {
    rules: HashMap<(String, ErrorSeverity), BacktrackRule>,
}

impl BacktrackRules {
    /// Build a table from a list of rules. Later duplicates replace earlier ones.
    pub fn new(rules: Vec<BacktrackRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| ((r.skill_id.clone(), r.severity), r))
            .collect();
        Self { rules }
    }

    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Built-in rules matching the builtin catalog.
    pub fn builtin() -> Self {
        Self::new(vec![
            BacktrackRule {
                skill_id: "frac-add".to_string(),
                severity: ErrorSeverity::L3,
                backtrack_to: vec!["frac-basics".to_string(), "int-add".to_string()],
                message: "Let's revisit how fractions work before adding them.".to_string(),
            },
            BacktrackRule {
                skill_id: "int-div".to_string(),
                severity: ErrorSeverity::L3,
                backtrack_to: vec!["int-mul".to_string()],
                message: "Division undoes multiplication - a quick review will help.".to_string(),
            },
            BacktrackRule {
                skill_id: "linear-eq".to_string(),
                severity: ErrorSeverity::L2,
                backtrack_to: vec!["int-sub".to_string()],
                message: "Solving equations leans on subtraction; let's practice that.".to_string(),
            },
        ])
    }

    /// Load rules from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let rules: Vec<BacktrackRule> = serde_yaml::from_str(yaml)?;
        Ok(Self::new(rules))
    }

    /// Exact-match lookup by skill and severity.
    pub fn lookup(&self, skill_id: &str, severity: ErrorSeverity) -> Option<&BacktrackRule> {
        self.rules.get(&(skill_id.to_string(), severity))
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
