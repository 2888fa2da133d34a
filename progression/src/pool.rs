//! Problem pool arbitration.
//!
//! Decides where the next practice problem comes from. The order is
//! fixed: an unseen pool problem, then a retry of one the student got
//! wrong, and only then a fresh generation through the fallback chain.
//! Generated problems are written back to the shared pool on a
//! best-effort basis so later students hit the pool instead of the
//! generator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sensei_agent::{ChainPreference, GenerationRequest, GenerationService};

use crate::config::PoolConfig;
use crate::store::{AttemptStore, ProblemPoolStore};
use crate::types::{ProgressionError, Result};

/// One pre-generated problem in the shared pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemPoolEntry {
    /// Unique entry id
    pub id: String,
    /// Skill the problem exercises
    pub skill_id: String,
    /// Difficulty level, 1-4
    pub level: u8,
    /// Problem content (question, answer, explanation)
    pub payload: Value,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

impl ProblemPoolEntry {
    /// Create an entry with a fresh id.
    pub fn new(skill_id: impl Into<String>, level: u8, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            skill_id: skill_id.into(),
            level,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Override the generated id (tests, imports).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Where a served problem came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSource {
    /// Unseen problem from the shared pool
    Pool,
    /// A problem the student previously got wrong
    Retry,
    /// Freshly generated for this request
    AiGenerated,
}

impl ProblemSource {
    /// Stable string form, used in session history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Retry => "retry",
            Self::AiGenerated => "ai_generated",
        }
    }
}

/// Outcome of a swallowed side effect.
///
/// The pool write after generation must not fail the request that
/// triggered it, but callers still get to see what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    /// Side effect succeeded
    Ok,
    /// Side effect failed; primary path continued anyway
    Failed(String),
    /// Side effect was not applicable to this path
    NotAttempted,
}

/// A problem chosen for a student, with provenance.
#[derive(Debug, Clone)]
pub struct ServedProblem {
    /// The problem itself
    pub entry: ProblemPoolEntry,
    /// Which arm of the arbitration served it
    pub source: ProblemSource,
    /// Pool size for this (skill, level) after serving
    pub pool_count: usize,
    /// Outcome of the post-generation pool write
    pub pool_write: BestEffort,
}

/// Picks the next problem for a (user, skill, level) request.
pub struct ProblemArbiter {
    pool: Arc<dyn ProblemPoolStore>,
    attempts: Arc<dyn AttemptStore>,
    generation: Arc<GenerationService>,
    config: PoolConfig,
    preference: ChainPreference,
}

impl ProblemArbiter {
    pub fn new(
        pool: Arc<dyn ProblemPoolStore>,
        attempts: Arc<dyn AttemptStore>,
        generation: Arc<GenerationService>,
        config: PoolConfig,
    ) -> Self {
        Self {
            pool,
            attempts,
            generation,
            config,
            preference: ChainPreference::Fast,
        }
    }

    /// Override the chain preference used for generation.
    pub fn with_preference(mut self, preference: ChainPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Serve the next problem.
    ///
    /// Strict order: first unseen pool entry (insertion order), then the
    /// first pool entry the student answered wrong and never got right,
    /// then generation. Only generation can fail the request.
    pub async fn next_problem(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
    ) -> Result<ServedProblem> {
        let entries = self.pool.list(skill_id, level).await?;
        let seen = self
            .attempts
            .attempted_ids(user_id, skill_id, level, false)
            .await?;

        if let Some(entry) = entries.iter().find(|e| !seen.contains(&e.id)) {
            debug!(user_id, skill_id, level, problem_id = %entry.id, "Serving unseen pool problem");
            return Ok(ServedProblem {
                entry: entry.clone(),
                source: ProblemSource::Pool,
                pool_count: entries.len(),
                pool_write: BestEffort::NotAttempted,
            });
        }

        let wrong = self
            .attempts
            .attempted_ids(user_id, skill_id, level, true)
            .await?;

        if let Some(entry) = entries.iter().find(|e| wrong.contains(&e.id)) {
            debug!(user_id, skill_id, level, problem_id = %entry.id, "Serving retry of a missed problem");
            return Ok(ServedProblem {
                entry: entry.clone(),
                source: ProblemSource::Retry,
                pool_count: entries.len(),
                pool_write: BestEffort::NotAttempted,
            });
        }

        self.generate_problem(user_id, skill_id, level, entries.len())
            .await
    }

    /// Whether the (skill, level) bucket is below the replenishment
    /// watermark. The arbiter only reports; it never schedules refills.
    pub async fn is_pool_low(&self, skill_id: &str, level: u8) -> Result<bool> {
        let count = self.pool.count(skill_id, level).await?;
        Ok(count < self.config.low_watermark)
    }

    async fn generate_problem(
        &self,
        user_id: &str,
        skill_id: &str,
        level: u8,
        prior_count: usize,
    ) -> Result<ServedProblem> {
        info!(user_id, skill_id, level, "Pool exhausted, generating a problem");

        let request = GenerationRequest::user(format!(
            "Create one practice problem for skill \"{skill_id}\" at difficulty level {level} \
             (1 = easiest, 4 = hardest). Respond with a JSON object containing \"question\", \
             \"answer\" and \"explanation\" fields."
        ))
        .with_system("You are a math tutor generating practice problems.")
        .with_max_tokens(1024)
        .with_json_output();

        let outcome = self.generation.generate(request, self.preference).await?;

        let payload: Value = serde_json::from_str(&outcome.response.content)
            .map_err(|e| ProgressionError::InvalidGeneratedContent(e.to_string()))?;
        if !payload.is_object() {
            return Err(ProgressionError::InvalidGeneratedContent(
                "expected a JSON object".to_string(),
            ));
        }

        let entry = ProblemPoolEntry::new(skill_id, level, payload);

        // Write-back is best effort: the student keeps their problem even
        // when the shared pool is unavailable.
        let pool_write = match self.pool.insert(entry.clone()).await {
            Ok(()) => BestEffort::Ok,
            Err(e) => {
                warn!(skill_id, level, error = %e, "Pool write-back failed, serving anyway");
                BestEffort::Failed(e.to_string())
            }
        };

        let pool_count = match &pool_write {
            BestEffort::Ok => self
                .pool
                .count(skill_id, level)
                .await
                .unwrap_or(prior_count + 1),
            _ => prior_count,
        };

        Ok(ServedProblem {
            entry,
            source: ProblemSource::AiGenerated,
            pool_count,
            pool_write,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use sensei_agent::backend::mock::MockGenerator;
    use sensei_agent::{CandidateConfig, ContentGenerator, GeneratorFactory};

    use crate::store::{
        InMemoryAttemptStore, InMemoryProblemPoolStore, ProblemAttempt, StoreError,
    };

    struct SharedMockFactory {
        mock: Arc<MockGenerator>,
    }

    impl GeneratorFactory for SharedMockFactory {
        fn generator_for(&self, _candidate: &CandidateConfig) -> Arc<dyn ContentGenerator> {
            Arc::clone(&self.mock) as Arc<dyn ContentGenerator>
        }
    }

    /// Pool store whose writes always fail; reads delegate to an inner
    /// in-memory store.
    struct ReadOnlyPoolStore {
        inner: InMemoryProblemPoolStore,
    }

    #[async_trait]
    impl ProblemPoolStore for ReadOnlyPoolStore {
        async fn list(
            &self,
            skill_id: &str,
            level: u8,
        ) -> std::result::Result<Vec<ProblemPoolEntry>, StoreError> {
            self.inner.list(skill_id, level).await
        }

        async fn insert(&self, _entry: ProblemPoolEntry) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("pool is read-only".to_string()))
        }

        async fn count(&self, skill_id: &str, level: u8) -> std::result::Result<usize, StoreError> {
            self.inner.count(skill_id, level).await
        }
    }

    fn generation(mock: MockGenerator) -> (Arc<GenerationService>, Arc<MockGenerator>) {
        let mock = Arc::new(mock);
        let service = GenerationService::new(Arc::new(SharedMockFactory {
            mock: Arc::clone(&mock),
        }));
        (Arc::new(service), mock)
    }

    fn arbiter_with(
        pool: Arc<dyn ProblemPoolStore>,
        attempts: Arc<InMemoryAttemptStore>,
        mock: MockGenerator,
    ) -> (ProblemArbiter, Arc<MockGenerator>) {
        let (service, mock) = generation(mock);
        let arbiter = ProblemArbiter::new(pool, attempts, service, PoolConfig::default());
        (arbiter, mock)
    }

    fn entry(id: &str) -> ProblemPoolEntry {
        ProblemPoolEntry::new("frac-add", 2, json!({ "question": id })).with_id(id)
    }

    fn attempt(problem: &str, correct: bool) -> ProblemAttempt {
        ProblemAttempt {
            user_id: "u1".to_string(),
            skill_id: "frac-add".to_string(),
            level: 2,
            problem_id: problem.to_string(),
            correct,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unseen_pool_problem_first() {
        // With unseen entries in the pool, no generation happens and
        // the earliest unseen entry is served.
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        pool.insert(entry("p1")).await.unwrap();
        pool.insert(entry("p2")).await.unwrap();

        let attempts = Arc::new(InMemoryAttemptStore::new());
        attempts.record_attempt(attempt("p1", true)).await.unwrap();

        let (arbiter, mock) = arbiter_with(pool, attempts, MockGenerator::new("m"));
        let served = arbiter.next_problem("u1", "frac-add", 2).await.unwrap();

        assert_eq!(served.source, ProblemSource::Pool);
        assert_eq!(served.entry.id, "p2");
        assert_eq!(served.pool_write, BestEffort::NotAttempted);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_when_all_seen() {
        // Every entry seen, p2 never answered correctly.
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        pool.insert(entry("p1")).await.unwrap();
        pool.insert(entry("p2")).await.unwrap();

        let attempts = Arc::new(InMemoryAttemptStore::new());
        attempts.record_attempt(attempt("p1", true)).await.unwrap();
        attempts.record_attempt(attempt("p2", false)).await.unwrap();

        let (arbiter, mock) = arbiter_with(pool, attempts, MockGenerator::new("m"));
        let served = arbiter.next_problem("u1", "frac-add", 2).await.unwrap();

        assert_eq!(served.source, ProblemSource::Retry);
        assert_eq!(served.entry.id, "p2");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_when_exhausted() {
        // Everything seen and answered correctly; generation runs and
        // the result lands in the pool.
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        pool.insert(entry("p1")).await.unwrap();

        let attempts = Arc::new(InMemoryAttemptStore::new());
        attempts.record_attempt(attempt("p1", true)).await.unwrap();

        let (arbiter, mock) = arbiter_with(
            Arc::clone(&pool) as Arc<dyn ProblemPoolStore>,
            attempts,
            MockGenerator::new("m").with_response(r#"{"question": "1/2 + 1/4?", "answer": "3/4"}"#),
        );
        let served = arbiter.next_problem("u1", "frac-add", 2).await.unwrap();

        assert_eq!(served.source, ProblemSource::AiGenerated);
        assert_eq!(served.pool_write, BestEffort::Ok);
        assert_eq!(served.pool_count, 2);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(pool.count("frac-add", 2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pool_write_failure_is_swallowed() {
        let pool = Arc::new(ReadOnlyPoolStore {
            inner: InMemoryProblemPoolStore::new(),
        });
        let attempts = Arc::new(InMemoryAttemptStore::new());

        let (arbiter, _mock) = arbiter_with(
            pool,
            attempts,
            MockGenerator::new("m").with_response(r#"{"question": "2 + 2?"}"#),
        );
        let served = arbiter.next_problem("u1", "frac-add", 2).await.unwrap();

        assert_eq!(served.source, ProblemSource::AiGenerated);
        assert!(matches!(served.pool_write, BestEffort::Failed(_)));
        assert_eq!(served.pool_count, 0);
    }

    #[tokio::test]
    async fn test_generation_exhaustion_surfaces() {
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        let attempts = Arc::new(InMemoryAttemptStore::new());

        let (arbiter, _mock) =
            arbiter_with(pool, attempts, MockGenerator::new("m").failing_first(100));
        let err = arbiter.next_problem("u1", "frac-add", 2).await.unwrap_err();

        assert!(matches!(err, ProgressionError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_unparseable_generation_rejected() {
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        let attempts = Arc::new(InMemoryAttemptStore::new());

        let (arbiter, _mock) = arbiter_with(
            pool,
            attempts,
            MockGenerator::new("m").with_response("here is your problem: 2 + 2"),
        );
        let err = arbiter.next_problem("u1", "frac-add", 2).await.unwrap_err();

        assert!(matches!(err, ProgressionError::InvalidGeneratedContent(_)));
    }

    #[tokio::test]
    async fn test_pool_low_watermark() {
        let pool = Arc::new(InMemoryProblemPoolStore::new());
        pool.insert(entry("p1")).await.unwrap();

        let attempts = Arc::new(InMemoryAttemptStore::new());
        let (arbiter, _mock) = arbiter_with(
            Arc::clone(&pool) as Arc<dyn ProblemPoolStore>,
            attempts,
            MockGenerator::new("m"),
        );

        assert!(arbiter.is_pool_low("frac-add", 2).await.unwrap());

        pool.insert(entry("p2")).await.unwrap();
        pool.insert(entry("p3")).await.unwrap();
        assert!(!arbiter.is_pool_low("frac-add", 2).await.unwrap());
    }
}
