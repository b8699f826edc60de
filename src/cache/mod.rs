//! Persistent message cache.
//!
//! A best-effort local backup of recent messages per conversation. The
//! in-memory buffer is authoritative; this cache is only read once, at cold
//! start, and written through on every buffer mutation via [`CacheWriter`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod noop;
pub mod redb;
pub mod types;
pub mod writer;

pub use types::CachedRecord;
pub use writer::{CacheFailure, CacheOp, CacheWriter, DEFAULT_QUEUE_CAPACITY, FailureHook};

/// Default number of records kept per conversation.
pub const DEFAULT_CONVERSATION_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The storage engine could not be opened in this environment.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] ::redb::StorageError),

    #[error("table error: {0}")]
    Table(#[from] ::redb::TableError),

    #[error("transaction error: {0}")]
    Transaction(#[from] ::redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] ::redb::CommitError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The write-behind queue was full and the write was dropped.
    #[error("cache write queue full")]
    QueueFull,
}

impl CacheError {
    /// Callers treat an unavailable cache as an empty one.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Replace every record of a conversation with the newest records of
    /// `records`, atomically.
    async fn replace_conversation(
        &self,
        conversation: &str,
        records: Vec<CachedRecord>,
    ) -> Result<(), CacheError>;

    /// Insert or overwrite one record, then evict the chronologically oldest
    /// records of its conversation beyond the limit.
    async fn upsert(&self, record: CachedRecord) -> Result<(), CacheError>;

    /// Remove a single record. Returns whether it existed.
    async fn remove(&self, conversation: &str, msgid: &str) -> Result<bool, CacheError>;

    /// Load a conversation's records, oldest first.
    async fn load_conversation(&self, conversation: &str) -> Result<Vec<CachedRecord>, CacheError>;

    /// Conversation keys that have at least one cached record.
    async fn conversations(&self) -> Result<Vec<String>, CacheError>;

    /// Delete all records of one conversation. Returns how many were removed.
    async fn clear_conversation(&self, conversation: &str) -> Result<usize, CacheError>;

    /// Destroy the whole store, pins included.
    async fn clear_all(&self) -> Result<(), CacheError>;

    /// Overwrite the pinned ids of a conversation.
    async fn save_pins(&self, conversation: &str, pins: Vec<String>) -> Result<(), CacheError>;

    /// Pinned ids for every conversation that has any.
    async fn load_pins(&self) -> Result<BTreeMap<String, Vec<String>>, CacheError>;
}
