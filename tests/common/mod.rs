//! Integration test common infrastructure.
//!
//! Provides an on-disk cache fixture and message builders.

use chrono::{DateTime, Duration, TimeZone, Utc};
use slirc_store::Message;
use slirc_store::cache::redb::RedbCache;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A redb cache in a temporary directory, removed on drop.
pub struct TestCache {
    pub dir: TempDir,
}

impl TestCache {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("cache").join("messages.redb")
    }

    /// A fresh handle on the same file, as a restarted client would open.
    pub fn open(&self) -> Arc<RedbCache> {
        Arc::new(RedbCache::new(self.path()))
    }

    #[allow(dead_code)]
    pub fn open_with_limit(&self, limit: usize) -> Arc<RedbCache> {
        Arc::new(RedbCache::with_limit(self.path(), limit))
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
}

pub fn msg(id: &str, target: &str, seconds: i64) -> Message {
    Message::new(id, "alice", target, format!("message {id}"), at(seconds))
}
