//! Curriculum - static skill data for the Sensei tutoring engine.
//!
//! Provides the immutable inputs every other component consumes:
//! - **Skill catalog**: directed acyclic graph of skill definitions,
//!   validated at load (duplicate ids, dangling prerequisites, cycles)
//! - **Backtrack rules**: (skill, error severity) to review targets
//!
//! Everything here is loaded once at process start and passed by
//! reference; there is no hot reload.

pub mod backtrack;
pub mod catalog;
pub mod types;

// Re-export main types
pub use backtrack::{BacktrackRule, BacktrackRules, ErrorSeverity};
pub use catalog::{CatalogError, SkillCatalog};
pub use types::{category_weight, Importance, SkillDefinition};
