//! Persistent message cache configuration.

use serde::Deserialize;

use super::types::default_true;
use crate::cache::{DEFAULT_CONVERSATION_LIMIT, DEFAULT_QUEUE_CAPACITY};

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// When false, the store runs purely in memory.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path to the redb database file. Parent directories are created on
    /// first use.
    #[serde(default = "default_cache_path")]
    pub path: String,
    /// Records kept per conversation on disk.
    #[serde(
        default = "default_per_conversation_limit",
        rename = "per-conversation-limit"
    )]
    pub per_conversation_limit: usize,
    /// Pending write-through operations held before new ones are dropped.
    #[serde(default = "default_queue_capacity", rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            per_conversation_limit: default_per_conversation_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_cache_path() -> String {
    "message-cache.redb".to_string()
}

fn default_per_conversation_limit() -> usize {
    DEFAULT_CONVERSATION_LIMIT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_serde_defaults() {
        let parsed: CacheConfig = toml::from_str("").unwrap();
        let built = CacheConfig::default();
        assert_eq!(parsed.enabled, built.enabled);
        assert_eq!(parsed.path, built.path);
        assert_eq!(parsed.per_conversation_limit, built.per_conversation_limit);
        assert_eq!(parsed.queue_capacity, built.queue_capacity);
        assert_eq!(built.queue_capacity, 1000);
    }

    #[test]
    fn snake_case_limit_key_is_not_recognised() {
        let parsed: CacheConfig = toml::from_str("per_conversation_limit = 5").unwrap();
        assert_eq!(parsed.per_conversation_limit, DEFAULT_CONVERSATION_LIMIT);
    }
}
