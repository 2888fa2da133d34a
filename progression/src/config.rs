//! Configuration for the progression engine.

use serde::{Deserialize, Serialize};

/// Configuration for the full progression engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Mastery state machine thresholds
    pub mastery: MasteryConfig,
    /// Problem pool settings
    pub pool: PoolConfig,
    /// Daily advice cache settings
    pub advice: AdviceConfig,
    /// Maximum learning-history entries per student
    pub history_limit: usize,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            mastery: MasteryConfig::default(),
            pool: PoolConfig::default(),
            advice: AdviceConfig::default(),
            history_limit: 500,
        }
    }
}

impl ProgressionConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Mastery state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryConfig {
    /// EMA smoothing factor for score updates
    pub ema_alpha: f64,
    /// Score / level at which a skill becomes mastered
    pub mastered_threshold: u8,
    /// Score / level at which a skill becomes perfect
    pub perfect_threshold: u8,
    /// Discrete rank cap
    pub rank_cap: u8,
    /// Score forced through the EMA path when rank reaches the cap
    pub rank_completion_score: u8,
    /// Mastery-level floor contributed per rank step
    pub rank_level_step: u8,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            mastered_threshold: 70,
            perfect_threshold: 95,
            rank_cap: 3,
            rank_completion_score: 90,
            rank_level_step: 33,
        }
    }
}

/// Problem pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Below this entry count the pool is considered low and callers may
    /// trigger asynchronous replenishment
    pub low_watermark: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { low_watermark: 3 }
    }
}

/// Daily advice cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceConfig {
    /// Cache TTL in seconds
    pub ttl_secs: u64,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}
