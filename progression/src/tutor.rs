//! The tutor orchestrator.
//!
//! Wires the static curriculum, the mastery engine, the stores, the
//! problem arbiter and the generation service into one entry point.
//! Every mutation follows the same cycle: take the per-user lock, load
//! the model, apply pure engine functions, bump the version, save.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use curriculum::{BacktrackRules, ErrorSeverity, SkillCatalog, SkillDefinition};
use sensei_agent::{ChainPreference, GenerationRequest, GenerationService};

use crate::advice::AdviceCache;
use crate::config::ProgressionConfig;
use crate::mastery;
use crate::pool::{ProblemArbiter, ServedProblem};
use crate::recommend::{self, BacktrackAdvice, ProgressSummary, Recommendation};
use crate::store::{AttemptStore, MasteryStore, ProblemAttempt, ProblemPoolStore};
use crate::types::{ProgressionError, Result, SessionRecord, SkillStatus, StudentModel};

/// Result of a score submission.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Status after the update
    pub status: SkillStatus,
    /// Smoothed level after the update
    pub mastery_level: u8,
    /// Skills the cascade unlocked
    pub newly_unlocked: Vec<String>,
}

/// Result of a rank-path practice success.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    /// Rank after the update
    pub rank: u8,
    /// Status after the update
    pub status: SkillStatus,
    /// Skills the cascade unlocked
    pub newly_unlocked: Vec<String>,
}

/// Top-level tutoring engine.
pub struct Tutor {
    catalog: Arc<SkillCatalog>,
    rules: Arc<BacktrackRules>,
    config: ProgressionConfig,
    mastery_store: Arc<dyn MasteryStore>,
    attempt_store: Arc<dyn AttemptStore>,
    arbiter: ProblemArbiter,
    generation: Arc<GenerationService>,
    advice: AdviceCache,
    // Serializes the load-modify-save cycle per user. The store's version
    // check backstops multi-process deployments.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Tutor {
    pub fn new(
        catalog: Arc<SkillCatalog>,
        rules: Arc<BacktrackRules>,
        config: ProgressionConfig,
        mastery_store: Arc<dyn MasteryStore>,
        pool_store: Arc<dyn ProblemPoolStore>,
        attempt_store: Arc<dyn AttemptStore>,
        generation: Arc<GenerationService>,
    ) -> Self {
        let arbiter = ProblemArbiter::new(
            pool_store,
            Arc::clone(&attempt_store),
            Arc::clone(&generation),
            config.pool.clone(),
        );
        let advice = AdviceCache::new(&config.advice);

        info!(
            skills = catalog.len(),
            catalog_hash = %catalog.catalog_hash(),
            "Tutor initialized"
        );

        Self {
            catalog,
            rules,
            config,
            mastery_store,
            attempt_store,
            arbiter,
            generation,
            advice,
            user_locks: DashMap::new(),
        }
    }

    /// The catalog this tutor teaches from.
    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn require_skill(&self, skill_id: &str) -> Result<()> {
        if self.catalog.contains(skill_id) {
            Ok(())
        } else {
            Err(ProgressionError::UnknownSkill(skill_id.to_string()))
        }
    }

    async fn load_or_new(&self, user_id: &str) -> Result<StudentModel> {
        Ok(self
            .mastery_store
            .load(user_id)
            .await?
            .unwrap_or_else(|| StudentModel::new(user_id)))
    }

    async fn persist(&self, model: &mut StudentModel) -> Result<()> {
        model.version += 1;
        self.mastery_store.save(model).await?;
        Ok(())
    }

    /// Serve the next practice problem for a skill at a level.
    pub async fn practice(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
    ) -> Result<ServedProblem> {
        self.require_skill(skill_id)?;

        let served = self.arbiter.next_problem(user_id, skill_id, level).await?;

        if self.arbiter.is_pool_low(skill_id, level).await? {
            debug!(skill_id, level, "Problem pool below watermark");
        }

        Ok(served)
    }

    /// Record the outcome of an attempt at a served problem.
    pub async fn record_attempt(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
        problem_id: &str,
        correct: bool,
    ) -> Result<()> {
        self.require_skill(skill_id)?;
        self.attempt_store
            .record_attempt(ProblemAttempt {
                user_id: user_id.to_string(),
                skill_id: skill_id.to_string(),
                level,
                problem_id: problem_id.to_string(),
                correct,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Submit a session score for a skill.
    ///
    /// Applies the smoothed score update, runs the unlock cascade, appends
    /// to the learning history and persists the model.
    pub async fn submit_score(
        &self,
        user_id: &str,
        skill_id: &str,
        score: u8,
        source: &str,
    ) -> Result<ScoreOutcome> {
        self.require_skill(skill_id)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut model = self.load_or_new(user_id).await?;

        mastery::apply_score(&self.catalog, &mut model, skill_id, score, &self.config.mastery, now);
        let newly_unlocked = mastery::unlock_cascade(&self.catalog, &mut model, now);

        model.push_history(
            SessionRecord {
                skill_id: skill_id.to_string(),
                score,
                source: source.to_string(),
                timestamp: now,
            },
            self.config.history_limit,
        );

        self.persist(&mut model).await?;

        let entry = &model.skills[skill_id];
        info!(
            user_id,
            skill_id,
            score,
            level = entry.mastery_level,
            status = ?entry.status,
            unlocked = newly_unlocked.len(),
            "Score applied"
        );

        Ok(ScoreOutcome {
            status: entry.status,
            mastery_level: entry.mastery_level,
            newly_unlocked,
        })
    }

    /// Apply one qualifying practice success on the rank path.
    pub async fn rank_up(&self, user_id: &str, skill_id: &str) -> Result<RankOutcome> {
        self.require_skill(skill_id)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut model = self.load_or_new(user_id).await?;

        mastery::rank_up(&self.catalog, &mut model, skill_id, &self.config.mastery, now);
        let newly_unlocked = mastery::unlock_cascade(&self.catalog, &mut model, now);

        self.persist(&mut model).await?;

        let entry = &model.skills[skill_id];
        Ok(RankOutcome {
            rank: entry.rank,
            status: entry.status,
            newly_unlocked,
        })
    }

    /// Bulk-master a set of skills ("skip challenge" passed).
    pub async fn skip_challenge(
        &self,
        user_id: &str,
        skill_ids: &[String],
    ) -> Result<Vec<String>> {
        for skill_id in skill_ids {
            self.require_skill(skill_id)?;
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut model = self.load_or_new(user_id).await?;

        let newly_unlocked =
            mastery::master_all(&self.catalog, &mut model, skill_ids, &self.config.mastery, now);

        self.persist(&mut model).await?;

        info!(
            user_id,
            mastered = skill_ids.len(),
            unlocked = newly_unlocked.len(),
            "Skip challenge applied"
        );

        Ok(newly_unlocked)
    }

    /// Ranked next-skill recommendations.
    pub async fn recommendations(
        &self,
        user_id: &str,
        count: usize,
    ) -> Result<Vec<Recommendation>> {
        let model = self.load_or_new(user_id).await?;
        Ok(recommend::recommend_next(&self.catalog, &model, count))
    }

    /// Ordered learning path from current knowledge to a target skill.
    pub async fn learning_path(
        &self,
        user_id: &str,
        target: &str,
    ) -> Result<Vec<SkillDefinition>> {
        let model = self.load_or_new(user_id).await?;
        let path = recommend::learning_path(&self.catalog, &model, target)?;
        Ok(path.into_iter().cloned().collect())
    }

    /// Backtrack advice after an error on a skill.
    pub fn backtrack_advice(
        &self,
        skill_id: &str,
        severity: ErrorSeverity,
    ) -> Option<BacktrackAdvice<'_>> {
        recommend::backtrack_advice(&self.rules, &self.catalog, skill_id, severity)
    }

    /// Overall progress summary for a user.
    pub async fn progress(&self, user_id: &str) -> Result<ProgressSummary> {
        let model = self.load_or_new(user_id).await?;
        Ok(recommend::progress_summary(&self.catalog, &model))
    }

    /// Daily study advice, generated once per TTL window and cached.
    pub async fn daily_advice(&self, user_id: &str) -> Result<String> {
        let now = Utc::now();
        if let Some(cached) = self.advice.get(user_id, now) {
            debug!(user_id, "Serving cached daily advice");
            return Ok(cached);
        }

        let model = self.load_or_new(user_id).await?;
        let summary = recommend::progress_summary(&self.catalog, &model);
        let learning: Vec<&str> = model
            .skills
            .values()
            .filter(|e| e.status == SkillStatus::Learning)
            .map(|e| e.skill_id.as_str())
            .collect();

        let request = GenerationRequest::user(format!(
            "A student has mastered {} of {} skills ({:.0}%) and is currently working on: {}. \
             Write two sentences of encouraging, concrete study advice for today.",
            summary.mastered,
            summary.total,
            summary.percent_mastered,
            if learning.is_empty() {
                "nothing yet".to_string()
            } else {
                learning.join(", ")
            }
        ))
        .with_system("You are a supportive math tutor.")
        .with_max_tokens(256);

        let outcome = self
            .generation
            .generate(request, ChainPreference::Reasoning)
            .await?;
        let text = outcome.response.content;

        self.advice.put(user_id, &text, now);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use curriculum::{Importance, SkillDefinition};
    use sensei_agent::backend::mock::MockGenerator;
    use sensei_agent::{CandidateConfig, ContentGenerator, GeneratorFactory};

    use crate::pool::{BestEffort, ProblemPoolEntry, ProblemSource};
    use crate::store::{InMemoryAttemptStore, InMemoryMasteryStore, InMemoryProblemPoolStore};

    struct SharedMockFactory {
        mock: Arc<MockGenerator>,
    }

    impl GeneratorFactory for SharedMockFactory {
        fn generator_for(&self, _candidate: &CandidateConfig) -> Arc<dyn ContentGenerator> {
            Arc::clone(&self.mock) as Arc<dyn ContentGenerator>
        }
    }

    fn catalog() -> Arc<SkillCatalog> {
        Arc::new(
            SkillCatalog::new(vec![
                SkillDefinition::new("count", "Counting", "foundation")
                    .with_importance(Importance::Core),
                SkillDefinition::new("add", "Addition", "arithmetic")
                    .with_importance(Importance::Core)
                    .with_prerequisites(["count"]),
                SkillDefinition::new("frac", "Fractions", "arithmetic")
                    .with_prerequisites(["add"]),
            ])
            .unwrap(),
        )
    }

    fn tutor_with(mock: MockGenerator) -> (Tutor, Arc<MockGenerator>, Arc<InMemoryProblemPoolStore>) {
        let mock = Arc::new(mock);
        let generation = Arc::new(GenerationService::new(Arc::new(SharedMockFactory {
            mock: Arc::clone(&mock),
        })));
        let pool = Arc::new(InMemoryProblemPoolStore::new());

        let tutor = Tutor::new(
            catalog(),
            Arc::new(BacktrackRules::empty()),
            ProgressionConfig::default(),
            Arc::new(InMemoryMasteryStore::default()),
            Arc::clone(&pool) as Arc<dyn ProblemPoolStore>,
            Arc::new(InMemoryAttemptStore::new()),
            generation,
        );
        (tutor, mock, pool)
    }

    #[tokio::test]
    async fn test_unknown_skill_rejected() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));
        let err = tutor.submit_score("u1", "nope", 80, "pool").await.unwrap_err();
        assert!(matches!(err, ProgressionError::UnknownSkill(_)));
    }

    #[tokio::test]
    async fn test_submit_score_masters_and_unlocks() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));

        let outcome = tutor.submit_score("u1", "count", 85, "pool").await.unwrap();
        assert_eq!(outcome.status, SkillStatus::Mastered);
        assert!(outcome.newly_unlocked.contains(&"add".to_string()));

        let summary = tutor.progress("u1").await.unwrap();
        assert_eq!(summary.mastered, 1);
        assert_eq!(summary.unlocked, 1);
    }

    #[tokio::test]
    async fn test_versions_advance_across_mutations() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));

        tutor.submit_score("u1", "count", 50, "pool").await.unwrap();
        tutor.submit_score("u1", "count", 60, "pool").await.unwrap();
        tutor.rank_up("u1", "count").await.unwrap();

        let model = tutor.mastery_store.load("u1").await.unwrap().unwrap();
        assert_eq!(model.version, 3);
        assert_eq!(model.history.len(), 2);
    }

    #[tokio::test]
    async fn test_rank_up_to_mastery() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));

        tutor.rank_up("u1", "count").await.unwrap();
        tutor.rank_up("u1", "count").await.unwrap();
        let outcome = tutor.rank_up("u1", "count").await.unwrap();

        assert_eq!(outcome.rank, 3);
        assert!(outcome.status.is_mastered());
        assert!(outcome.newly_unlocked.contains(&"add".to_string()));
    }

    #[tokio::test]
    async fn test_skip_challenge() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));

        let unlocked = tutor
            .skip_challenge("u1", &["count".to_string(), "add".to_string()])
            .await
            .unwrap();
        assert_eq!(unlocked, vec!["frac".to_string()]);
    }

    #[tokio::test]
    async fn test_practice_serves_pool_then_generates() {
        let (tutor, mock, pool) = tutor_with(
            MockGenerator::new("m").with_response(r#"{"question": "3 + 4?", "answer": "7"}"#),
        );
        pool.insert(ProblemPoolEntry::new("count", 1, json!({ "question": "1, 2, ...?" })))
            .await
            .unwrap();

        let served = tutor.practice("u1", "count", 1).await.unwrap();
        assert_eq!(served.source, ProblemSource::Pool);
        assert_eq!(mock.call_count(), 0);

        tutor
            .record_attempt("u1", "count", 1, &served.entry.id, true)
            .await
            .unwrap();

        let served = tutor.practice("u1", "count", 1).await.unwrap();
        assert_eq!(served.source, ProblemSource::AiGenerated);
        assert_eq!(served.pool_write, BestEffort::Ok);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_recommendations_reflect_state() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));
        tutor.submit_score("u1", "count", 85, "pool").await.unwrap();

        let recs = tutor.recommendations("u1", 5).await.unwrap();
        assert_eq!(recs[0].skill_id, "add");
    }

    #[tokio::test]
    async fn test_learning_path_to_target() {
        let (tutor, _, _) = tutor_with(MockGenerator::new("m"));
        tutor.submit_score("u1", "count", 85, "pool").await.unwrap();

        let path = tutor.learning_path("u1", "frac").await.unwrap();
        let ids: Vec<_> = path.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["add", "frac"]);
    }

    #[tokio::test]
    async fn test_daily_advice_is_cached() {
        let (tutor, mock, _) =
            tutor_with(MockGenerator::new("m").with_response("Keep practicing addition."));

        let first = tutor.daily_advice("u1").await.unwrap();
        let second = tutor.daily_advice("u1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
    }
}
