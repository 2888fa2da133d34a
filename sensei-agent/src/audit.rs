//! Audit trail for generation attempts.
//!
//! Every fallback-chain attempt is recorded so operators can see which
//! models and regions are actually serving traffic and which are failing.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::traits::TokenUsage;

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Outcome of a single generation attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The candidate produced a response
    Succeeded,
    /// The candidate failed with this error message
    Failed(String),
}

impl AttemptOutcome {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One recorded generation attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Unique entry ID
    pub entry_id: String,
    /// Logical request this attempt belongs to
    pub request_id: String,
    /// Model tried
    pub model: String,
    /// Region tried
    pub region: String,
    /// 1-based attempt number within the chain
    pub attempt: usize,
    /// Outcome
    pub outcome: AttemptOutcome,
    /// Token usage (successful attempts only)
    pub usage: Option<TokenUsage>,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// Attempt duration in ms
    pub duration_ms: u64,
}

/// Bounded log of generation attempts (newest first).
pub struct GenerationAuditLog {
    entries: Arc<RwLock<VecDeque<AttemptRecord>>>,
    max_entries: usize,
}

impl GenerationAuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: MAX_AUDIT_ENTRIES,
        }
    }

    /// Create with a custom retention limit.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Record an attempt.
    pub async fn record(&self, record: AttemptRecord) {
        let mut entries = self.entries.write().await;
        entries.push_front(record);
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AttemptRecord> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Total entries currently retained.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for GenerationAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request_id: &str, attempt: usize) -> AttemptRecord {
        AttemptRecord {
            entry_id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            model: "sensei-pro".to_string(),
            region: "global".to_string(),
            attempt,
            outcome: AttemptOutcome::Succeeded,
            usage: None,
            started_at: Utc::now(),
            duration_ms: 12,
        }
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let log = GenerationAuditLog::new();
        log.record(record("r1", 1)).await;
        log.record(record("r2", 1)).await;

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        // Newest first
        assert_eq!(recent[0].request_id, "r2");
    }

    #[tokio::test]
    async fn test_bounded_retention() {
        let log = GenerationAuditLog::with_max_entries(2);
        for i in 0..5 {
            log.record(record(&format!("r{}", i), 1)).await;
        }
        assert_eq!(log.len().await, 2);
        let recent = log.recent(10).await;
        assert_eq!(recent[0].request_id, "r4");
    }
}
