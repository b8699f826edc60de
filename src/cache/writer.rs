//! Write-behind queue between the message buffer and the cache.
//!
//! The buffer submits operations without awaiting them. A single task applies
//! them in submission order; failures are logged and reported to an optional
//! hook, never returned to the submitter. The queue is bounded: when the disk
//! falls behind, new writes are dropped rather than buffered without limit.

use super::{CacheError, CacheProvider, CachedRecord};
use crate::telemetry::{OpTimer, spans};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, warn};

/// A pending cache write.
#[derive(Debug, Clone)]
pub enum CacheOp {
    Upsert(CachedRecord),
    Remove { conversation: String, msgid: String },
    Replace { conversation: String, records: Vec<CachedRecord> },
    SavePins { conversation: String, pins: Vec<String> },
    Clear { conversation: String },
    ClearAll,
}

impl CacheOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::SavePins { .. } => "save_pins",
            Self::Clear { .. } => "clear",
            Self::ClearAll => "clear_all",
        }
    }

    pub fn conversation(&self) -> Option<&str> {
        match self {
            Self::Upsert(record) => Some(&record.conversation),
            Self::Remove { conversation, .. }
            | Self::Replace { conversation, .. }
            | Self::SavePins { conversation, .. }
            | Self::Clear { conversation } => Some(conversation),
            Self::ClearAll => None,
        }
    }
}

/// A write that the cache rejected.
#[derive(Debug)]
pub struct CacheFailure {
    pub op: &'static str,
    pub conversation: Option<String>,
    pub error: CacheError,
}

/// Diagnostic callback for failed writes.
pub type FailureHook = Arc<dyn Fn(&CacheFailure) + Send + Sync>;

/// Pending writes held before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

pub struct CacheWriter {
    sender: Sender<CacheOp>,
    handle: JoinHandle<()>,
    on_failure: Option<FailureHook>,
}

impl CacheWriter {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(provider: Arc<dyn CacheProvider>) -> Self {
        Self::spawn_with(provider, DEFAULT_QUEUE_CAPACITY, None)
    }

    pub fn spawn_with_hook(provider: Arc<dyn CacheProvider>, on_failure: Option<FailureHook>) -> Self {
        Self::spawn_with(provider, DEFAULT_QUEUE_CAPACITY, on_failure)
    }

    /// Spawn with an explicit queue bound (at least 1).
    pub fn spawn_with(
        provider: Arc<dyn CacheProvider>,
        capacity: usize,
        on_failure: Option<FailureHook>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(Self::run(provider, receiver, on_failure.clone()));
        Self {
            sender,
            handle,
            on_failure,
        }
    }

    /// Queue a write. Never blocks; a full queue drops the write.
    pub fn submit(&self, op: CacheOp) {
        match self.sender.try_send(op) {
            Ok(()) => {}
            Err(TrySendError::Full(op)) => {
                warn!(op = op.name(), conversation = ?op.conversation(), "Cache write queue full, dropping write");
                if let Some(hook) = &self.on_failure {
                    hook(&CacheFailure {
                        op: op.name(),
                        conversation: op.conversation().map(str::to_string),
                        error: CacheError::QueueFull,
                    });
                }
            }
            Err(TrySendError::Closed(op)) => {
                warn!(op = op.name(), "Cache writer stopped, dropping write");
            }
        }
    }

    /// Stop accepting writes and wait for the queued ones to finish.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cache writer task failed");
        }
    }

    async fn run(
        provider: Arc<dyn CacheProvider>,
        mut receiver: Receiver<CacheOp>,
        on_failure: Option<FailureHook>,
    ) {
        while let Some(op) = receiver.recv().await {
            let name = op.name();
            let conversation = op.conversation().map(str::to_string);
            let span = spans::cache_op(name, conversation.as_deref());
            let timer = OpTimer::new(name);
            let result = Self::apply(provider.as_ref(), op).instrument(span).await;
            drop(timer);

            if let Err(error) = result {
                if error.is_unavailable() {
                    debug!(op = name, error = %error, "Cache unavailable, write dropped");
                } else {
                    warn!(op = name, conversation = ?conversation, error = %error, "Cache write failed");
                }
                if let Some(hook) = &on_failure {
                    hook(&CacheFailure {
                        op: name,
                        conversation,
                        error,
                    });
                }
            }
        }
        debug!("Cache writer drained");
    }

    async fn apply(provider: &dyn CacheProvider, op: CacheOp) -> Result<(), CacheError> {
        match op {
            CacheOp::Upsert(record) => provider.upsert(record).await,
            CacheOp::Remove {
                conversation,
                msgid,
            } => provider.remove(&conversation, &msgid).await.map(drop),
            CacheOp::Replace {
                conversation,
                records,
            } => provider.replace_conversation(&conversation, records).await,
            CacheOp::SavePins { conversation, pins } => provider.save_pins(&conversation, pins).await,
            CacheOp::Clear { conversation } => provider.clear_conversation(&conversation).await.map(drop),
            CacheOp::ClearAll => provider.clear_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::noop::NoOpCache;
    use crate::cache::redb::RedbCache;
    use crate::message::MessageKind;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(msgid: &str) -> CachedRecord {
        CachedRecord {
            msgid: msgid.to_string(),
            conversation: "#rust".to_string(),
            target: "#rust".to_string(),
            nick: "alice".to_string(),
            account: None,
            text: "hello".to_string(),
            time: "2024-03-01T12:00:00.000Z".to_string(),
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
    async fn queued_writes_land_in_order() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(RedbCache::new(dir.path().join("cache.redb")));
        let writer = CacheWriter::spawn(cache.clone());

        writer.submit(CacheOp::Upsert(record("a")));
        writer.submit(CacheOp::Upsert(record("b")));
        writer.submit(CacheOp::Remove {
            conversation: "#rust".to_string(),
            msgid: "a".to_string(),
        });
        writer.close().await;

        let loaded = cache.load_conversation("#rust").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].msgid, "b");
    }

    #[tokio::test]
    async fn failures_reach_the_hook() {
        let failures: Arc<Mutex<Vec<(&'static str, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let hook: FailureHook = Arc::new(move |f: &CacheFailure| {
            sink.lock().push((f.op, f.error.is_unavailable()));
        });

        let writer = CacheWriter::spawn_with_hook(Arc::new(NoOpCache), Some(hook));
        writer.submit(CacheOp::Upsert(record("a")));
        writer.submit(CacheOp::ClearAll);
        writer.close().await;

        assert_eq!(*failures.lock(), vec![("upsert", true), ("clear_all", true)]);
    }

    #[tokio::test]
    async fn full_queue_drops_write_and_reports_it() {
        let failures: Arc<Mutex<Vec<(&'static str, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let hook: FailureHook = Arc::new(move |f: &CacheFailure| {
            sink.lock().push((f.op, matches!(f.error, CacheError::QueueFull)));
        });

        // The current-thread runtime does not run the writer task until the
        // test yields, so the second submit finds the queue full.
        let writer = CacheWriter::spawn_with(Arc::new(NoOpCache), 1, Some(hook));
        writer.submit(CacheOp::Upsert(record("a")));
        writer.submit(CacheOp::Remove {
            conversation: "#rust".to_string(),
            msgid: "b".to_string(),
        });
        assert_eq!(*failures.lock(), vec![("remove", true)]);

        writer.close().await;
        assert_eq!(*failures.lock(), vec![("remove", true), ("upsert", false)]);
    }

    #[tokio::test]
    async fn bounded_queue_still_lands_every_write_when_drained() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(RedbCache::new(dir.path().join("cache.redb")));
        let writer = CacheWriter::spawn_with(cache.clone(), 4, None);

        for id in ["a", "b", "c"] {
            writer.submit(CacheOp::Upsert(record(id)));
        }
        writer.close().await;

        assert_eq!(cache.load_conversation("#rust").await.unwrap().len(), 3);
    }

    #[test]
    fn op_names_and_conversations() {
        let op = CacheOp::Clear {
            conversation: "#a".to_string(),
        };
        assert_eq!(op.name(), "clear");
        assert_eq!(op.conversation(), Some("#a"));
        assert_eq!(CacheOp::ClearAll.conversation(), None);
    }
}
