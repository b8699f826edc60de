//! Cache provider used when persistence is disabled.
//!
//! Every operation reports [`CacheError::Unavailable`], which callers already
//! treat as an empty cache and a dropped write.

use super::{CacheError, CacheProvider, CachedRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct NoOpCache;

fn disabled() -> CacheError {
    CacheError::Unavailable("message cache disabled".to_string())
}

#[async_trait]
impl CacheProvider for NoOpCache {
    async fn replace_conversation(
        &self,
        _conversation: &str,
        _records: Vec<CachedRecord>,
    ) -> Result<(), CacheError> {
        Err(disabled())
    }

    async fn upsert(&self, _record: CachedRecord) -> Result<(), CacheError> {
        Err(disabled())
    }

    async fn remove(&self, _conversation: &str, _msgid: &str) -> Result<bool, CacheError> {
        Err(disabled())
    }

    async fn load_conversation(&self, _conversation: &str) -> Result<Vec<CachedRecord>, CacheError> {
        Err(disabled())
    }

    async fn conversations(&self) -> Result<Vec<String>, CacheError> {
        Err(disabled())
    }

    async fn clear_conversation(&self, _conversation: &str) -> Result<usize, CacheError> {
        Err(disabled())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        Err(disabled())
    }

    async fn save_pins(&self, _conversation: &str, _pins: Vec<String>) -> Result<(), CacheError> {
        Err(disabled())
    }

    async fn load_pins(&self) -> Result<BTreeMap<String, Vec<String>>, CacheError> {
        Err(disabled())
    }
}
