//! Core types for the progression engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-skill mastery status.
///
/// A total order of progress. Progress is monotonic except for the one
/// explicit demotion path (`mastery::reset_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillStatus {
    /// Prerequisites not yet satisfied
    Locked,
    /// Available to practice
    Unlocked,
    /// Practice has begun
    Learning,
    /// Score or smoothed level reached the mastery threshold
    Mastered,
    /// Score or smoothed level reached the perfect threshold
    Perfect,
}

impl SkillStatus {
    /// Whether the skill is available to the learner (anything but Locked).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Locked)
    }

    /// Whether the skill counts as mastered for prerequisite checks.
    pub fn is_mastered(&self) -> bool {
        matches!(self, Self::Mastered | Self::Perfect)
    }
}

impl Default for SkillStatus {
    fn default() -> Self {
        Self::Locked
    }
}

/// Mutable per-user, per-skill mastery record.
///
/// `mastery_level` is the continuous exponentially-smoothed score (0-100);
/// `rank` is the discrete practice counter (0-3). They are reconciled by
/// the state machine: rank 3 forces mastered status, and mastered status
/// implies rank 3 (repaired on load if a legacy record disagrees).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMastery {
    /// Skill this record tracks
    pub skill_id: String,
    /// Current status
    #[serde(default)]
    pub status: SkillStatus,
    /// Smoothed score, 0-100
    #[serde(default)]
    pub mastery_level: u8,
    /// Discrete practice progress, 0-3
    #[serde(default)]
    pub rank: u8,
    /// Total attempts, monotonically increasing
    #[serde(default)]
    pub attempts: u32,
    /// Best observed score
    #[serde(default)]
    pub best_score: Option<u8>,
    /// Timestamp of the last score update
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    /// Timestamp of the last rank-path practice
    #[serde(default)]
    pub last_practiced: Option<DateTime<Utc>>,
    /// When the skill unlocked
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    /// When the skill was first mastered
    #[serde(default)]
    pub mastered_at: Option<DateTime<Utc>>,
}

impl SkillMastery {
    /// Create a fresh locked record.
    pub fn locked(skill_id: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            status: SkillStatus::Locked,
            mastery_level: 0,
            rank: 0,
            attempts: 0,
            best_score: None,
            last_attempt: None,
            last_practiced: None,
            unlocked_at: None,
            mastered_at: None,
        }
    }

    /// Create a fresh unlocked record (entry-point skills).
    pub fn unlocked(skill_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: SkillStatus::Unlocked,
            unlocked_at: Some(now),
            ..Self::locked(skill_id)
        }
    }
}

/// One practice session entry in the learning history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Skill practiced
    pub skill_id: String,
    /// Score achieved (0-100)
    pub score: u8,
    /// Where the problem came from
    pub source: String,
    /// When the session ended
    pub timestamp: DateTime<Utc>,
}

/// Learner-independence metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndependenceMetrics {
    /// Problems solved without hints
    pub unaided_solves: u32,
    /// Hints requested
    pub hints_requested: u32,
    /// Sessions started by the learner rather than prompted
    pub self_started_sessions: u32,
}

/// Per-user aggregate: the unit of whole-document read-modify-write.
///
/// Every mutation loads the full model, computes a new one, and writes it
/// back; concurrent mutations for the same user must be serialized by the
/// caller (see `Tutor`) and the store's version check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentModel {
    /// Owning user
    pub user_id: String,
    /// Optimistic-concurrency version, bumped on every save
    #[serde(default)]
    pub version: u64,
    /// Mastery records, created lazily per skill on first touch
    #[serde(default)]
    pub skills: HashMap<String, SkillMastery>,
    /// Mistake-pattern counters keyed by error label
    #[serde(default)]
    pub mistake_patterns: HashMap<String, u32>,
    /// Bounded, append-only learning history
    #[serde(default)]
    pub history: Vec<SessionRecord>,
    /// Independence metrics
    #[serde(default)]
    pub independence: IndependenceMetrics,
}

impl StudentModel {
    /// Create an empty model for a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            version: 0,
            skills: HashMap::new(),
            mistake_patterns: HashMap::new(),
            history: Vec::new(),
            independence: IndependenceMetrics::default(),
        }
    }

    /// Append a session record, trimming the oldest past `limit`.
    pub fn push_history(&mut self, record: SessionRecord, limit: usize) {
        self.history.push(record);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Count a mistake pattern occurrence.
    pub fn record_mistake(&mut self, pattern: impl Into<String>) {
        *self.mistake_patterns.entry(pattern.into()).or_insert(0) += 1;
    }
}

/// Error types for the progression engine.
#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    /// Skill id not present in the catalog
    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    /// Store operation failed
    #[error("Store error: {0}")]
    StoreError(#[from] crate::store::StoreError),

    /// Generation failed after exhausting the fallback chain
    #[error("Could not generate a problem: {0}")]
    GenerationFailed(#[from] sensei_agent::ServiceError),

    /// Generated content could not be parsed into a problem
    #[error("Generated content unusable: {0}")]
    InvalidGeneratedContent(String),
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(!SkillStatus::Locked.is_active());
        assert!(SkillStatus::Learning.is_active());
        assert!(SkillStatus::Mastered.is_mastered());
        assert!(SkillStatus::Perfect.is_mastered());
        assert!(!SkillStatus::Learning.is_mastered());
    }

    #[test]
    fn test_status_ordering() {
        assert!(SkillStatus::Locked < SkillStatus::Unlocked);
        assert!(SkillStatus::Unlocked < SkillStatus::Learning);
        assert!(SkillStatus::Learning < SkillStatus::Mastered);
        assert!(SkillStatus::Mastered < SkillStatus::Perfect);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut model = StudentModel::new("u1");
        for i in 0..10 {
            model.push_history(
                SessionRecord {
                    skill_id: format!("s{}", i),
                    score: 80,
                    source: "pool".to_string(),
                    timestamp: Utc::now(),
                },
                5,
            );
        }
        assert_eq!(model.history.len(), 5);
        // Oldest entries were trimmed
        assert_eq!(model.history[0].skill_id, "s5");
    }
}
