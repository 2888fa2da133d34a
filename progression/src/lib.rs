//! Progression - the adaptive tutoring engine.
//!
//! Tracks per-student skill mastery over the static curriculum, decides
//! what to study next, and arbitrates where practice problems come from
//! (shared pool, retry of missed problems, or generation through the
//! fallback chain).
//!
//! The engine core (`mastery`, `recommend`) is pure and synchronous;
//! all I/O lives behind the async store traits and the generation
//! service. [`Tutor`] ties the pieces together.

pub mod advice;
pub mod config;
pub mod mastery;
pub mod pool;
pub mod recommend;
pub mod store;
pub mod tutor;
pub mod types;

// Re-export main types for convenience
pub use advice::AdviceCache;
pub use config::{AdviceConfig, MasteryConfig, PoolConfig, ProgressionConfig};
pub use pool::{BestEffort, ProblemArbiter, ProblemPoolEntry, ProblemSource, ServedProblem};
pub use recommend::{BacktrackAdvice, ProgressSummary, Recommendation};
pub use store::{
    AttemptStore, InMemoryAttemptStore, InMemoryMasteryStore, InMemoryProblemPoolStore,
    MasteryStore, ProblemAttempt, ProblemPoolStore, StoreError,
};
pub use tutor::{RankOutcome, ScoreOutcome, Tutor};
pub use types::{
    IndependenceMetrics, ProgressionError, Result, SessionRecord, SkillMastery, SkillStatus,
    StudentModel,
};
