//! Generation fallback chain.
//!
//! An ordered list of (model, region) candidates tried in sequence until
//! one succeeds. Modeled as an explicit cursor over an immutable candidate
//! list so a chain can be constructed, logged, and reset without relying
//! on hidden internal state. One instance per logical outbound request;
//! the chain carries no cross-request state.

use serde::{Deserialize, Serialize};

/// How much reasoning budget a candidate is asked to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingDepth {
    /// No extended reasoning
    Minimal,
    /// Default reasoning budget
    Standard,
    /// Maximum reasoning budget
    Deep,
}

/// A single (model, region) candidate in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Model identifier
    pub model: String,
    /// Serving region ("global" or a stable regional endpoint)
    pub region: String,
    /// Whether this is a preview model release
    pub preview: bool,
    /// Reasoning budget for this candidate
    pub thinking: ThinkingDepth,
}

impl CandidateConfig {
    /// Create a candidate.
    pub fn new(
        model: impl Into<String>,
        region: impl Into<String>,
        preview: bool,
        thinking: ThinkingDepth,
    ) -> Self {
        Self {
            model: model.into(),
            region: region.into(),
            preview,
            thinking,
        }
    }
}

/// Which predefined chain a request should use.
///
/// A boolean choice made once per outbound request, not adaptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainPreference {
    /// Reasoning-heavy chain (problem generation, evaluation)
    Reasoning,
    /// Fast chain (advice, short responses)
    Fast,
}

impl Default for ChainPreference {
    fn default() -> Self {
        Self::Reasoning
    }
}

/// Ordered, stateful iterator over generation candidates.
pub struct FallbackChain {
    candidates: Vec<CandidateConfig>,
    cursor: usize,
}

impl FallbackChain {
    /// Create a chain from an explicit candidate list.
    pub fn new(candidates: Vec<CandidateConfig>) -> Self {
        Self {
            candidates,
            cursor: 0,
        }
    }

    /// Create the chain for a preference.
    pub fn for_preference(preference: ChainPreference) -> Self {
        match preference {
            ChainPreference::Reasoning => Self::reasoning(),
            ChainPreference::Fast => Self::fast(),
        }
    }

    /// The reasoning-heavy chain: preview global models first, then three
    /// stable-region fallbacks.
    pub fn reasoning() -> Self {
        Self::new(vec![
            CandidateConfig::new("sensei-pro-preview", "global", true, ThinkingDepth::Deep),
            CandidateConfig::new("sensei-flash-preview", "global", true, ThinkingDepth::Standard),
            CandidateConfig::new("sensei-pro", "us-central1", false, ThinkingDepth::Deep),
            CandidateConfig::new("sensei-pro", "europe-west4", false, ThinkingDepth::Standard),
            CandidateConfig::new("sensei-flash", "asia-northeast1", false, ThinkingDepth::Minimal),
        ])
    }

    /// The fast chain: preview global fast model, then two stable-region
    /// fallbacks.
    pub fn fast() -> Self {
        Self::new(vec![
            CandidateConfig::new("sensei-flash-preview", "global", true, ThinkingDepth::Minimal),
            CandidateConfig::new("sensei-flash", "us-central1", false, ThinkingDepth::Minimal),
            CandidateConfig::new("sensei-flash", "asia-northeast1", false, ThinkingDepth::Minimal),
        ])
    }

    /// Hand out the next untried candidate, or `None` once exhausted.
    pub fn next_config(&mut self) -> Option<CandidateConfig> {
        let candidate = self.candidates.get(self.cursor).cloned();
        if candidate.is_some() {
            self.cursor += 1;
        }
        candidate
    }

    /// How many candidates have been dispensed so far (1-based for logging).
    pub fn attempt_count(&self) -> usize {
        self.cursor
    }

    /// Whether every candidate has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.candidates.len()
    }

    /// Rewind to the start. For reuse across independent requests, never
    /// mid-request.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Total number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the chain has no candidates at all.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
