//! Storage boundary.
//!
//! Async traits for the three persistence concerns (student models, the
//! shared problem pool, per-user attempt history) plus dashmap-backed
//! in-memory implementations used by tests and single-process
//! deployments. Durable backends implement the same traits elsewhere.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::MasteryConfig;
use crate::mastery;
use crate::pool::ProblemPoolEntry;
use crate::types::StudentModel;

/// Error types for the storage boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A concurrent writer saved the model first
    #[error("Version conflict for user {user_id}: tried to save version {attempted}, store has {current}")]
    VersionConflict {
        user_id: String,
        attempted: u64,
        current: u64,
    },

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Persistence for the per-user student model.
///
/// The model is a whole-document read-modify-write unit: callers load it,
/// mutate a copy, bump `version`, and save. `save` must reject a version
/// that is not exactly one ahead of the stored one.
#[async_trait]
pub trait MasteryStore: Send + Sync {
    /// Load a user's model. `None` for first-time users.
    async fn load(&self, user_id: &str) -> Result<Option<StudentModel>, StoreError>;

    /// Save a model, enforcing the optimistic version check.
    async fn save(&self, model: &StudentModel) -> Result<(), StoreError>;
}

/// Persistence for the shared pre-generated problem pool.
///
/// Entries for a (skill, level) bucket must come back in insertion order;
/// the arbitrator relies on that for deterministic serving.
#[async_trait]
pub trait ProblemPoolStore: Send + Sync {
    /// All entries for a skill at a level, oldest first.
    async fn list(&self, skill_id: &str, level: u8) -> Result<Vec<ProblemPoolEntry>, StoreError>;

    /// Append an entry to its bucket.
    async fn insert(&self, entry: ProblemPoolEntry) -> Result<(), StoreError>;

    /// Number of entries in a bucket.
    async fn count(&self, skill_id: &str, level: u8) -> Result<usize, StoreError>;
}

/// One recorded attempt at a pool problem.
#[derive(Debug, Clone)]
pub struct ProblemAttempt {
    /// Attempting user
    pub user_id: String,
    /// Skill the problem belongs to
    pub skill_id: String,
    /// Difficulty level attempted
    pub level: u8,
    /// Pool entry id
    pub problem_id: String,
    /// Whether the answer was correct
    pub correct: bool,
    /// When the attempt happened
    pub timestamp: DateTime<Utc>,
}

/// Persistence for per-user problem attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Ids of problems the user has attempted for (skill, level).
    /// With `wrong_only`, restrict to problems never answered correctly.
    async fn attempted_ids(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
        wrong_only: bool,
    ) -> Result<HashSet<String>, StoreError>;

    /// Record one attempt.
    async fn record_attempt(&self, attempt: ProblemAttempt) -> Result<(), StoreError>;
}

/// In-memory mastery store.
///
/// Applies the rank/status repair migration on every load, so legacy
/// records are healed before any engine code sees them.
pub struct InMemoryMasteryStore {
    models: DashMap<String, StudentModel>,
    mastery_cfg: MasteryConfig,
}

impl InMemoryMasteryStore {
    pub fn new(mastery_cfg: MasteryConfig) -> Self {
        Self {
            models: DashMap::new(),
            mastery_cfg,
        }
    }
}

impl Default for InMemoryMasteryStore {
    fn default() -> Self {
        Self::new(MasteryConfig::default())
    }
}

#[async_trait]
impl MasteryStore for InMemoryMasteryStore {
    async fn load(&self, user_id: &str) -> Result<Option<StudentModel>, StoreError> {
        let Some(stored) = self.models.get(user_id) else {
            return Ok(None);
        };
        let mut model = stored.clone();
        drop(stored);

        let repaired = mastery::repair(&mut model, &self.mastery_cfg);
        if repaired > 0 {
            debug!(user_id, repaired, "Repaired mastery records on load");
        }
        Ok(Some(model))
    }

    async fn save(&self, model: &StudentModel) -> Result<(), StoreError> {
        let current = self.models.get(&model.user_id).map(|m| m.version);
        match current {
            Some(current) if model.version != current + 1 => {
                return Err(StoreError::VersionConflict {
                    user_id: model.user_id.clone(),
                    attempted: model.version,
                    current,
                });
            }
            _ => {}
        }
        self.models.insert(model.user_id.clone(), model.clone());
        Ok(())
    }
}

/// In-memory problem pool keyed by (skill, level), insertion-ordered.
#[derive(Default)]
pub struct InMemoryProblemPoolStore {
    buckets: DashMap<(String, u8), Vec<ProblemPoolEntry>>,
}

impl InMemoryProblemPoolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProblemPoolStore for InMemoryProblemPoolStore {
    async fn list(&self, skill_id: &str, level: u8) -> Result<Vec<ProblemPoolEntry>, StoreError> {
        Ok(self
            .buckets
            .get(&(skill_id.to_string(), level))
            .map(|b| b.clone())
            .unwrap_or_default())
    }

    async fn insert(&self, entry: ProblemPoolEntry) -> Result<(), StoreError> {
        self.buckets
            .entry((entry.skill_id.clone(), entry.level))
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn count(&self, skill_id: &str, level: u8) -> Result<usize, StoreError> {
        Ok(self
            .buckets
            .get(&(skill_id.to_string(), level))
            .map(|b| b.len())
            .unwrap_or(0))
    }
}

/// In-memory attempt log keyed by user.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: DashMap<String, Vec<ProblemAttempt>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn attempted_ids(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
        wrong_only: bool,
    ) -> Result<HashSet<String>, StoreError> {
        let Some(attempts) = self.attempts.get(user_id) else {
            return Ok(HashSet::new());
        };

        let relevant = attempts
            .iter()
            .filter(|a| a.skill_id == skill_id && a.level == level);

        if !wrong_only {
            return Ok(relevant.map(|a| a.problem_id.clone()).collect());
        }

        // Wrong-only means never answered correctly, not merely
        // answered wrong at least once.
        let mut ever_correct = HashSet::new();
        let mut seen = HashSet::new();
        for attempt in relevant {
            seen.insert(attempt.problem_id.clone());
            if attempt.correct {
                ever_correct.insert(attempt.problem_id.clone());
            }
        }
        Ok(seen.difference(&ever_correct).cloned().collect())
    }

    async fn record_attempt(&self, attempt: ProblemAttempt) -> Result<(), StoreError> {
        self.attempts
            .entry(attempt.user_id.clone())
            .or_default()
            .push(attempt);
        Ok(())
    }
}
