//! Daily advice cache.
//!
//! Generated advice is cached per user with a fixed TTL so repeated
//! requests within a day reuse the same text instead of paying for a
//! generation. Cache writes never fail the primary path.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::AdviceConfig;

struct CachedAdvice {
    created_at: DateTime<Utc>,
    text: String,
}

/// Per-user advice cache with TTL expiry.
pub struct AdviceCache {
    entries: DashMap<String, CachedAdvice>,
    ttl: Duration,
}

impl AdviceCache {
    pub fn new(config: &AdviceConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(config.ttl_secs as i64),
        }
    }

    /// Get cached advice. Expired entries count as misses and are removed.
    pub fn get(&self, user_id: &str, now: DateTime<Utc>) -> Option<String> {
        let expired = match self.entries.get(user_id) {
            Some(cached) if now - cached.created_at < self.ttl => {
                return Some(cached.text.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!(user_id, "Evicting expired advice");
            self.entries.remove(user_id);
        }
        None
    }

    /// Cache advice for a user, replacing any previous entry.
    pub fn put(&self, user_id: impl Into<String>, text: impl Into<String>, now: DateTime<Utc>) {
        self.entries.insert(
            user_id.into(),
            CachedAdvice {
                created_at: now,
                text: text.into(),
            },
        );
    }

    /// Drop all expired entries.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| now - c.created_at < self.ttl);
        before - self.entries.len()
    }

    /// Number of cached entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AdviceCache {
    fn default() -> Self {
        Self::new(&AdviceConfig::default())
    }
}
