//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("buffer.capacity must be at least 1")]
    ZeroBufferCapacity,
    #[error("buffer.max_edit_hops must be at least 1")]
    ZeroEditHops,
    #[error("cache.per-conversation-limit must be at least 1")]
    ZeroCacheLimit,
    #[error("cache.path is required when the cache is enabled")]
    MissingCachePath,
    #[error("cache.queue-capacity must be at least 1")]
    ZeroQueueCapacity,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.buffer.capacity == 0 {
        errors.push(ValidationError::ZeroBufferCapacity);
    }
    if config.buffer.max_edit_hops == 0 {
        errors.push(ValidationError::ZeroEditHops);
    }

    // A disabled cache may carry any leftover values.
    if config.cache.enabled {
        if config.cache.per_conversation_limit == 0 {
            errors.push(ValidationError::ZeroCacheLimit);
        }
        if config.cache.path.trim().is_empty() {
            errors.push(ValidationError::MissingCachePath);
        }
        if config.cache.queue_capacity == 0 {
            errors.push(ValidationError::ZeroQueueCapacity);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
