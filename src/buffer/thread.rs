//! Reply-thread reconstruction over one conversation's messages.

use crate::message::Message;
use std::collections::{HashMap, HashSet};

/// Upper bound on reply-chain walks, guarding against malformed input.
pub const MAX_THREAD_DEPTH: usize = 1000;

/// Walk `reply_to` links upward from `msgid`.
///
/// Stops at a message without a parent, before a parent that is not
/// buffered, or when a link would revisit an id; returns the last id
/// reached. An id that is not buffered is returned unchanged.
pub fn thread_root(messages: &[Message], msgid: &str) -> String {
    root_from_links(&reply_links(messages), msgid)
}

/// Child id -> parent id for every buffered reply whose parent is buffered.
pub(crate) fn reply_links(messages: &[Message]) -> HashMap<&str, &str> {
    let buffered: HashSet<&str> = messages.iter().map(|m| m.msgid.as_str()).collect();
    messages
        .iter()
        .filter_map(|m| Some((m.msgid.as_str(), m.reply_to.as_deref()?)))
        .filter(|(_, parent)| buffered.contains(parent))
        .collect()
}

pub(crate) fn root_from_links(links: &HashMap<&str, &str>, msgid: &str) -> String {
    let mut current = msgid;
    let mut visited = HashSet::from([msgid]);

    for _ in 0..MAX_THREAD_DEPTH {
        let Some(&parent) = links.get(current) else {
            break;
        };
        if !visited.insert(parent) {
            break;
        }
        current = parent;
    }
    current.to_string()
}

/// All buffered messages reachable from `root` through replies, in buffer
/// order. Empty if `root` itself is not buffered.
pub fn thread<'a>(messages: &'a [Message], root: &str) -> Vec<&'a Message> {
    if !messages.iter().any(|m| m.msgid == root) {
        return Vec::new();
    }

    let mut members: HashSet<&str> = HashSet::from([root]);
    loop {
        let before = members.len();
        for msg in messages {
            if let Some(parent) = msg.reply_to.as_deref()
                && members.contains(parent)
            {
                members.insert(msg.msgid.as_str());
            }
        }
        if members.len() == before {
            break;
        }
    }

    messages
        .iter()
        .filter(|m| members.contains(m.msgid.as_str()))
        .collect()
}

/// Number of replies in the thread rooted at `root`.
pub fn thread_count(messages: &[Message], root: &str) -> usize {
    thread(messages, root).len().saturating_sub(1)
}

/// Whether any buffered message replies directly to `msgid`.
pub fn has_thread(messages: &[Message], msgid: &str) -> bool {
    messages.iter().any(|m| m.reply_to.as_deref() == Some(msgid))
}
