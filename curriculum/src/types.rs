//! Core types for the skill catalog.
//!
//! A skill is an atomic curriculum concept node in the prerequisite graph.
//! Definitions are authored once, loaded at startup, and never mutated.

use serde::{Deserialize, Serialize};

/// How important a skill is within the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Core curriculum - must be mastered
    Core,
    /// Standard material
    Standard,
    /// Advanced / enrichment material
    Advanced,
}

impl Importance {
    /// Get the additive recommendation weight for this importance tier.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Core => 100,
            Self::Standard => 50,
            Self::Advanced => 10,
        }
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self::Standard
    }
}

/// A single skill definition in the curriculum graph.
///
/// Prerequisites reference other skill ids in the same catalog. The
/// prerequisite relation must be acyclic; [`crate::SkillCatalog`]
/// enforces this at construction time because both the unlock cascade
/// and learning-path generation recurse over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// Unique identifier, e.g. "fractions-add"
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Subject category, e.g. "foundation", "algebra"
    pub category: String,
    /// Optional finer grouping within the category
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Importance tier
    #[serde(default)]
    pub importance: Importance,
    /// Skill ids that must be mastered before this skill unlocks
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Ordered keywords for search and prompt construction
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SkillDefinition {
    /// Create a minimal definition with no prerequisites.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            subcategory: None,
            importance: Importance::default(),
            prerequisites: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Builder: set importance.
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Builder: set prerequisites.
    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this skill has no prerequisites (an entry point).
    pub fn is_entry_point(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

/// Additive recommendation weight for a subject category.
///
/// Six ordered tiers with foundation material weighted highest; unknown
/// categories contribute nothing.
pub fn category_weight(category: &str) -> u32 {
    match category {
        "foundation" => 60,
        "arithmetic" => 50,
        "algebra" => 40,
        "geometry" => 30,
        "functions" => 20,
        "data" => 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_weights() {
        assert_eq!(Importance::Core.weight(), 100);
        assert_eq!(Importance::Standard.weight(), 50);
        assert_eq!(Importance::Advanced.weight(), 10);
    }

    #[test]
    fn test_category_weight_ordering() {
        let tiers = ["foundation", "arithmetic", "algebra", "geometry", "functions", "data"];
        for pair in tiers.windows(2) {
            assert!(category_weight(pair[0]) > category_weight(pair[1]));
        }
        assert_eq!(category_weight("underwater-basket-weaving"), 0);
    }

    #[test]
    fn test_builder() {
        let skill = SkillDefinition::new("frac-add", "Adding fractions", "arithmetic")
            .with_importance(Importance::Core)
            .with_prerequisites(["int-add"])
            .with_keywords(["fractions", "addition"]);

        assert!(!skill.is_entry_point());
        assert_eq!(skill.prerequisites, vec!["int-add"]);
    }
}
