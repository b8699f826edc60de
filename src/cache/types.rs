//! Storage-safe message records.

use crate::message::{MessageKind, SendState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable projection of a [`Message`](crate::message::Message), stored as a
/// JSON blob so fields can be added without a schema migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub msgid: String,
    /// Folded conversation key used by the secondary index.
    pub conversation: String,
    /// Conversation name with its original casing.
    pub target: String,
    pub nick: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub text: String,
    /// RFC 3339 UTC timestamp with millisecond precision; sorts
    /// lexicographically in chronological order.
    pub time: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Emoji -> sorted accounts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub redacted: bool,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_history: Option<Vec<String>>,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_state: Option<SendState>,
}

/// Just the ordering fields of a record, for eviction scans.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordTime {
    pub time: String,
}
