//! In-memory buffer configuration.

use serde::Deserialize;

use crate::buffer::{DEFAULT_CAPACITY, DEFAULT_MAX_EDIT_HOPS};

/// Limits for the per-conversation message buffer.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Messages kept per conversation before the oldest are evicted.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Bound on edit-chain hops when resolving the latest edit id.
    #[serde(default = "default_max_edit_hops")]
    pub max_edit_hops: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_edit_hops: default_max_edit_hops(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_edit_hops() -> usize {
    DEFAULT_MAX_EDIT_HOPS
}
