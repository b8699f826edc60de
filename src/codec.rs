//! Conversion between live messages and cached records.

use crate::cache::CachedRecord;
use crate::casemap::fold_key;
use crate::message::{Message, Reactions};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Format a timestamp as a fixed-width, lexicographically sortable string.
pub fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_time(value: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| CodecError::Timestamp {
            value: value.to_string(),
            source,
        })
}

pub fn to_record(msg: &Message) -> CachedRecord {
    CachedRecord {
        msgid: msg.msgid.clone(),
        conversation: fold_key(&msg.target),
        target: msg.target.clone(),
        nick: msg.nick.clone(),
        account: msg.account.clone(),
        text: msg.text.clone(),
        time: encode_time(&msg.time),
        tags: msg.tags.clone(),
        reply_to: msg.reply_to.clone(),
        thread_id: msg.thread_id.clone(),
        reactions: flatten_reactions(&msg.reactions),
        redacted: msg.redacted,
        edited: msg.edited,
        edit_history: msg.edit_history.clone(),
        kind: msg.kind,
        send_state: msg.send_state,
    }
}

pub fn from_record(record: CachedRecord) -> Result<Message, CodecError> {
    let time = decode_time(&record.time)?;
    let reactions: Reactions = record
        .reactions
        .into_iter()
        .filter(|(_, accounts)| !accounts.is_empty())
        .map(|(emoji, accounts)| (emoji, accounts.into_iter().collect::<HashSet<_>>()))
        .collect();

    Ok(Message {
        msgid: record.msgid,
        nick: record.nick,
        account: record.account,
        target: record.target,
        text: record.text,
        time,
        tags: record.tags,
        reply_to: record.reply_to,
        thread_id: record.thread_id,
        reactions,
        redacted: record.redacted,
        edited: record.edited,
        edit_history: record.edit_history,
        kind: record.kind,
        send_state: record.send_state,
    })
}

fn flatten_reactions(reactions: &Reactions) -> BTreeMap<String, Vec<String>> {
    reactions
        .iter()
        .filter(|(_, accounts)| !accounts.is_empty())
        .map(|(emoji, accounts)| {
            let mut accounts: Vec<String> = accounts.iter().cloned().collect();
            accounts.sort();
            (emoji.clone(), accounts)
        })
        .collect()
}
