//! Redb-backed message cache.
//!
//! # Schema
//!
//! ```text
//! messages:           "conversation\0msgid" -> CachedRecord (serde_json)
//! conversation_index: conversation =>> msgid   (multimap)
//! pins:               conversation =>> msgid   (multimap)
//! ```
//!
//! The database is opened lazily on first use. If it cannot be opened every
//! operation fails with [`CacheError::Unavailable`].

use super::types::RecordTime;
use super::{CacheError, CacheProvider, CachedRecord, DEFAULT_CONVERSATION_LIMIT};
use crate::casemap::fold_key;
use async_trait::async_trait;
use parking_lot::Mutex;
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");
const CONVERSATION_INDEX: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("conversation_index");
const PINS: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("pins");

pub struct RedbCache {
    path: PathBuf,
    limit: usize,
    db: Mutex<Option<Arc<Database>>>,
}

impl RedbCache {
    /// Create a cache backed by the file at `path`. Nothing is opened yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_limit(path, DEFAULT_CONVERSATION_LIMIT)
    }

    pub fn with_limit(path: impl AsRef<Path>, limit: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            limit,
            db: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn make_key(conversation: &str, msgid: &str) -> String {
        format!("{}\0{}", conversation, msgid)
    }

    /// Open the database and its tables on first use.
    fn handle(&self) -> Result<Arc<Database>, CacheError> {
        let mut guard = self.db.lock();
        if let Some(db) = guard.as_ref() {
            return Ok(Arc::clone(db));
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        }

        let db =
            Database::create(&self.path).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MESSAGES)?;
            let _ = write_txn.open_multimap_table(CONVERSATION_INDEX)?;
            let _ = write_txn.open_multimap_table(PINS)?;
        }
        write_txn.commit()?;

        info!(path = %self.path.display(), "Message cache opened");
        let db = Arc::new(db);
        *guard = Some(Arc::clone(&db));
        Ok(db)
    }

    fn encode(record: &CachedRecord) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(record).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl CacheProvider for RedbCache {
    async fn replace_conversation(
        &self,
        conversation: &str,
        mut records: Vec<CachedRecord>,
    ) -> Result<(), CacheError> {
        let conversation = fold_key(conversation);
        records.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.msgid.cmp(&b.msgid)));
        let keep_from = records.len().saturating_sub(self.limit);

        let db = self.handle()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            let mut index = write_txn.open_multimap_table(CONVERSATION_INDEX)?;

            let mut existing = Vec::new();
            for id in index.remove_all(conversation.as_str())? {
                existing.push(id?.value().to_string());
            }
            for id in &existing {
                table.remove(Self::make_key(&conversation, id).as_str())?;
            }

            for mut record in records.into_iter().skip(keep_from) {
                record.conversation.clone_from(&conversation);
                let value = Self::encode(&record)?;
                table.insert(
                    Self::make_key(&conversation, &record.msgid).as_str(),
                    value.as_slice(),
                )?;
                index.insert(conversation.as_str(), record.msgid.as_str())?;
            }
        }
        write_txn.commit()?;

        debug!(conversation = %conversation, "Replaced cached conversation");
        Ok(())
    }

    async fn upsert(&self, mut record: CachedRecord) -> Result<(), CacheError> {
        record.conversation = fold_key(&record.conversation);
        let conversation = record.conversation.clone();
        let value = Self::encode(&record)?;

        let db = self.handle()?;
        let write_txn = db.begin_write()?;
        let evicted = {
            let mut table = write_txn.open_table(MESSAGES)?;
            let mut index = write_txn.open_multimap_table(CONVERSATION_INDEX)?;
            table.insert(
                Self::make_key(&conversation, &record.msgid).as_str(),
                value.as_slice(),
            )?;
            index.insert(conversation.as_str(), record.msgid.as_str())?;

            let mut ids = Vec::new();
            for id in index.get(conversation.as_str())? {
                ids.push(id?.value().to_string());
            }

            let excess = ids.len().saturating_sub(self.limit);
            if excess > 0 {
                // Undecodable records sort first and are evicted first.
                let mut by_time = Vec::with_capacity(ids.len());
                for id in ids {
                    let time = table
                        .get(Self::make_key(&conversation, &id).as_str())?
                        .and_then(|v| serde_json::from_slice::<RecordTime>(v.value()).ok())
                        .map(|r| r.time)
                        .unwrap_or_default();
                    by_time.push((time, id));
                }
                by_time.sort();

                for (_, id) in by_time.iter().take(excess) {
                    table.remove(Self::make_key(&conversation, id).as_str())?;
                    index.remove(conversation.as_str(), id.as_str())?;
                }
            }
            excess
        };
        write_txn.commit()?;

        if evicted > 0 {
            debug!(conversation = %conversation, evicted, "Evicted oldest cached messages");
        }
        Ok(())
    }

    async fn remove(&self, conversation: &str, msgid: &str) -> Result<bool, CacheError> {
        let conversation = fold_key(conversation);
        let db = self.handle()?;
        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(MESSAGES)?;
            let mut index = write_txn.open_multimap_table(CONVERSATION_INDEX)?;
            index.remove(conversation.as_str(), msgid)?;
            table
                .remove(Self::make_key(&conversation, msgid).as_str())?
                .is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    async fn load_conversation(&self, conversation: &str) -> Result<Vec<CachedRecord>, CacheError> {
        let conversation = fold_key(conversation);
        let db = self.handle()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;
        let index = read_txn.open_multimap_table(CONVERSATION_INDEX)?;

        let mut records = Vec::new();
        for id in index.get(conversation.as_str())? {
            let id = id?;
            let key = Self::make_key(&conversation, id.value());
            let Some(value) = table.get(key.as_str())? else {
                warn!(conversation = %conversation, msgid = %id.value(), "Index entry without record, skipping");
                continue;
            };
            match serde_json::from_slice::<CachedRecord>(value.value()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(conversation = %conversation, msgid = %id.value(), error = %e, "Failed to deserialize cached message, skipping");
                }
            }
        }

        records.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.msgid.cmp(&b.msgid)));
        Ok(records)
    }

    async fn conversations(&self) -> Result<Vec<String>, CacheError> {
        let db = self.handle()?;
        let read_txn = db.begin_read()?;
        let index = read_txn.open_multimap_table(CONVERSATION_INDEX)?;

        let mut keys = Vec::new();
        for item in index.iter()? {
            let (key, _) = item?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    async fn clear_conversation(&self, conversation: &str) -> Result<usize, CacheError> {
        let conversation = fold_key(conversation);
        let db = self.handle()?;
        let write_txn = db.begin_write()?;
        let mut count = 0;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            let mut index = write_txn.open_multimap_table(CONVERSATION_INDEX)?;

            let mut ids = Vec::new();
            for id in index.remove_all(conversation.as_str())? {
                ids.push(id?.value().to_string());
            }
            for id in ids {
                if table
                    .remove(Self::make_key(&conversation, &id).as_str())?
                    .is_some()
                {
                    count += 1;
                }
            }
        }
        write_txn.commit()?;

        debug!(conversation = %conversation, count, "Cleared cached conversation");
        Ok(count)
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        // Drop our handle before deleting the file; the next call reopens it.
        let previous = self.db.lock().take();
        drop(previous);

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(path = %self.path.display(), "Message cache destroyed");
        Ok(())
    }

    async fn save_pins(&self, conversation: &str, pins: Vec<String>) -> Result<(), CacheError> {
        let conversation = fold_key(conversation);
        let db = self.handle()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_multimap_table(PINS)?;
            table.remove_all(conversation.as_str())?;
            for msgid in &pins {
                table.insert(conversation.as_str(), msgid.as_str())?;
            }
        }
        write_txn.commit()?;

        debug!(conversation = %conversation, count = pins.len(), "Saved pinned messages");
        Ok(())
    }

    async fn load_pins(&self) -> Result<BTreeMap<String, Vec<String>>, CacheError> {
        let db = self.handle()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_multimap_table(PINS)?;

        let mut pins = BTreeMap::new();
        for item in table.iter()? {
            let (key, values) = item?;
            let mut ids = Vec::new();
            for value in values {
                ids.push(value?.value().to_string());
            }
            pins.insert(key.value().to_string(), ids);
        }
        Ok(pins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tempfile::tempdir;

    fn create_test_cache(limit: usize) -> (RedbCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let cache = RedbCache::with_limit(dir.path().join("cache.redb"), limit);
        (cache, dir)
    }

    fn record(conversation: &str, msgid: &str, second: u32) -> CachedRecord {
        CachedRecord {
            msgid: msgid.to_string(),
            conversation: conversation.to_string(),
            target: conversation.to_string(),
            nick: "alice".to_string(),
            account: None,
            text: format!("text of {msgid}"),
            time: format!("2024-03-01T12:00:{:02}.000Z", second),
            tags: BTreeMap::new(),
            reply_to: None,
            thread_id: None,
            reactions: BTreeMap::new(),
            redacted: false,
            edited: false,
            edit_history: None,
            kind: MessageKind::Privmsg,
            send_state: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_load_sorted_by_time() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#rust", "c", 30)).await.unwrap();
        cache.upsert(record("#rust", "a", 10)).await.unwrap();
        cache.upsert(record("#rust", "b", 20)).await.unwrap();

        let loaded = cache.load_conversation("#rust").await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.msgid.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_record() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#rust", "a", 10)).await.unwrap();

        let mut edited = record("#rust", "a", 10);
        edited.text = "edited".to_string();
        edited.edited = true;
        cache.upsert(edited).await.unwrap();

        let loaded = cache.load_conversation("#rust").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "edited");
        assert!(loaded[0].edited);
    }

    #[tokio::test]
    async fn upsert_evicts_chronologically_oldest() {
        let (cache, _dir) = create_test_cache(3);
        // Ids deliberately sort opposite to time.
        cache.upsert(record("#rust", "z", 1)).await.unwrap();
        cache.upsert(record("#rust", "y", 2)).await.unwrap();
        cache.upsert(record("#rust", "x", 3)).await.unwrap();
        cache.upsert(record("#rust", "w", 4)).await.unwrap();

        let loaded = cache.load_conversation("#rust").await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.msgid.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "w"]);
    }

    #[tokio::test]
    async fn upsert_limit_is_per_conversation() {
        let (cache, _dir) = create_test_cache(2);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            cache.upsert(record("#one", id, i as u32)).await.unwrap();
        }
        cache.upsert(record("#two", "only", 0)).await.unwrap();

        assert_eq!(cache.load_conversation("#one").await.unwrap().len(), 2);
        assert_eq!(cache.load_conversation("#two").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_conversation_keeps_newest() {
        let (cache, _dir) = create_test_cache(2);
        cache.upsert(record("#rust", "stale", 59)).await.unwrap();

        let batch = vec![record("#rust", "a", 1), record("#rust", "c", 3), record("#rust", "b", 2)];
        cache.replace_conversation("#rust", batch).await.unwrap();

        let loaded = cache.load_conversation("#rust").await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.msgid.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"], "stale record removed, newest two kept");
    }

    #[tokio::test]
    async fn conversation_keys_are_folded() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#Rust", "a", 1)).await.unwrap();

        let loaded = cache.load_conversation("#RUST").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].conversation, "#rust");
        assert_eq!(loaded[0].target, "#Rust");
        assert_eq!(cache.conversations().await.unwrap(), vec!["#rust".to_string()]);
    }

    #[tokio::test]
    async fn conversations_lists_distinct_keys() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#a", "1", 1)).await.unwrap();
        cache.upsert(record("#a", "2", 2)).await.unwrap();
        cache.upsert(record("#b", "3", 3)).await.unwrap();

        let mut keys = cache.conversations().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["#a".to_string(), "#b".to_string()]);
    }

    #[tokio::test]
    async fn remove_single_record() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#rust", "a", 1)).await.unwrap();
        cache.upsert(record("#rust", "b", 2)).await.unwrap();

        assert!(cache.remove("#rust", "a").await.unwrap());
        assert!(!cache.remove("#rust", "a").await.unwrap());
        let loaded = cache.load_conversation("#rust").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].msgid, "b");
    }

    #[tokio::test]
    async fn clear_conversation_leaves_others() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#a", "1", 1)).await.unwrap();
        cache.upsert(record("#a", "2", 2)).await.unwrap();
        cache.upsert(record("#b", "3", 3)).await.unwrap();

        assert_eq!(cache.clear_conversation("#a").await.unwrap(), 2);
        assert!(cache.load_conversation("#a").await.unwrap().is_empty());
        assert_eq!(cache.conversations().await.unwrap(), vec!["#b".to_string()]);
    }

    #[tokio::test]
    async fn clear_all_destroys_and_reopens() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#a", "1", 1)).await.unwrap();
        cache.save_pins("#a", vec!["1".to_string()]).await.unwrap();

        cache.clear_all().await.unwrap();
        assert!(!cache.path().exists());

        assert!(cache.conversations().await.unwrap().is_empty());
        assert!(cache.load_pins().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pins_round_trip_and_overwrite() {
        let (cache, _dir) = create_test_cache(200);
        cache
            .save_pins("#a", vec!["1".to_string(), "2".to_string()])
            .await
            .unwrap();
        cache.save_pins("#b", vec!["9".to_string()]).await.unwrap();
        cache.save_pins("#a", vec!["2".to_string()]).await.unwrap();
        cache.save_pins("#b", Vec::new()).await.unwrap();

        let pins = cache.load_pins().await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins["#a"], vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn empty_conversation_loads_empty() {
        let (cache, _dir) = create_test_cache(200);
        assert!(cache.load_conversation("#nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unopenable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let cache = RedbCache::new(dir.path());
        let err = cache.conversations().await.unwrap_err();
        assert!(err.is_unavailable(), "expected unavailable, got {err}");
    }

    #[tokio::test]
    async fn corrupt_records_are_skipped_on_load() {
        let (cache, _dir) = create_test_cache(200);
        cache.upsert(record("#rust", "good", 1)).await.unwrap();

        let db = cache.handle().unwrap();
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(MESSAGES).unwrap();
            let mut index = write_txn.open_multimap_table(CONVERSATION_INDEX).unwrap();
            let key = RedbCache::make_key("#rust", "bad");
            table.insert(key.as_str(), b"{not json".as_slice()).unwrap();
            index.insert("#rust", "bad").unwrap();
            index.insert("#rust", "dangling").unwrap();
        }
        write_txn.commit().unwrap();

        let loaded = cache.load_conversation("#rust").await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.msgid.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
    }
}
