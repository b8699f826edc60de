//! In-memory message buffer.
//!
//! [`MessageStore`] keeps one bounded, chronologically ordered sequence of
//! messages per conversation, plus cursors, the edit chain and the pinned
//! set. Every operation is synchronous and total: unknown conversations or
//! ids produce a no-op, `false`, `None` or an empty result.
//!
//! When a [`CacheWriter`] is attached, each mutation also queues a
//! write-through to the persistent cache without waiting for it.

use crate::cache::{CacheOp, CacheWriter};
use crate::casemap::fold_key;
use crate::codec;
use crate::config::BufferConfig;
use crate::message::{Message, SendState, is_local_id};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub mod observer;
pub mod search;
pub mod thread;

pub use observer::{BufferEvent, BufferObserver};
pub use search::SearchQuery;

/// Default number of messages kept per conversation.
pub const DEFAULT_CAPACITY: usize = 500;

/// Default bound on edit-chain hops during resolution.
pub const DEFAULT_MAX_EDIT_HOPS: usize = 50;

static NO_PINS: BTreeSet<String> = BTreeSet::new();

/// Oldest and newest buffered message ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

struct Conversation {
    /// Name as first seen, for display.
    name: String,
    messages: Vec<Message>,
    cursors: Cursors,
}

#[derive(Clone, Copy)]
enum Side {
    Front,
    Back,
}

impl Conversation {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: Vec::new(),
            cursors: Cursors::default(),
        }
    }

    fn position(&self, msgid: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.msgid == msgid)
    }

    fn refresh_cursors(&mut self) {
        self.cursors = Cursors {
            oldest: self.messages.first().map(|m| m.msgid.clone()),
            newest: self.messages.last().map(|m| m.msgid.clone()),
        };
    }

    /// Drop oldest messages down to `capacity`, returning their ids.
    fn trim_front(&mut self, capacity: usize) -> Vec<String> {
        let excess = self.messages.len().saturating_sub(capacity);
        self.messages.drain(..excess).map(|m| m.msgid).collect()
    }

    /// Drop newest messages down to `capacity`, returning their ids.
    fn trim_back(&mut self, capacity: usize) -> Vec<String> {
        if self.messages.len() <= capacity {
            return Vec::new();
        }
        self.messages.split_off(capacity).into_iter().map(|m| m.msgid).collect()
    }

    /// Keep only batch messages whose ids are not buffered and not repeated.
    fn fresh(&self, batch: Vec<Message>) -> Vec<Message> {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.msgid.clone()).collect();
        batch
            .into_iter()
            .filter(|m| seen.insert(m.msgid.clone()))
            .collect()
    }

    /// Fill in reply thread ids that are missing, or that name a message now
    /// known to be a reply itself (its ancestors arrived later).
    ///
    /// The walk starts at the reply, so an id always matches what
    /// [`thread::thread_root`] reports for it at assignment time.
    ///
    /// Returns the ids whose thread id changed.
    fn assign_thread_ids(&mut self) -> Vec<String> {
        let links = thread::reply_links(&self.messages);
        let roots: Vec<(usize, String)> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.reply_to.is_some())
            .filter(|(_, m)| {
                m.thread_id
                    .as_deref()
                    .is_none_or(|root| links.contains_key(root))
            })
            .map(|(i, m)| (i, thread::root_from_links(&links, &m.msgid)))
            .collect();
        let mut changed = Vec::new();
        for (i, root) in roots {
            let msg = &mut self.messages[i];
            if msg.thread_id.as_deref() != Some(root.as_str()) {
                msg.thread_id = Some(root);
                changed.push(msg.msgid.clone());
            }
        }
        changed
    }
}

/// Per-session message store.
pub struct MessageStore {
    capacity: usize,
    max_edit_hops: usize,
    conversations: HashMap<String, Conversation>,
    /// Original msgid -> replacement msgid.
    edit_chain: HashMap<String, String>,
    pinned: HashMap<String, BTreeSet<String>>,
    observers: Vec<Arc<dyn BufferObserver>>,
    writer: Option<CacheWriter>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MessageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            max_edit_hops: DEFAULT_MAX_EDIT_HOPS,
            conversations: HashMap::new(),
            edit_chain: HashMap::new(),
            pinned: HashMap::new(),
            observers: Vec::new(),
            writer: None,
        }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        let mut store = Self::new(config.capacity);
        store.max_edit_hops = config.max_edit_hops;
        store
    }

    /// Attach a write-through target.
    pub fn with_writer(mut self, writer: CacheWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Detach the write-through target, e.g. to [`CacheWriter::close`] it.
    pub fn take_writer(&mut self) -> Option<CacheWriter> {
        self.writer.take()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn BufferObserver>) {
        self.observers.push(observer);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append one message to its conversation.
    ///
    /// Returns `false` if a message with the same server id is already
    /// buffered. Overflow evicts the oldest messages.
    pub fn append(&mut self, msg: Message) -> bool {
        let key = fold_key(&msg.target);
        let msgid = msg.msgid.clone();
        let capacity = self.capacity;

        let conv = self
            .conversations
            .entry(key.clone())
            .or_insert_with(|| Conversation::new(&msg.target));
        if !is_local_id(&msgid) && conv.position(&msgid).is_some() {
            debug!(conversation = %key, msgid = %msgid, "Ignoring duplicate message");
            return false;
        }

        conv.messages.push(msg);
        let evicted = conv.trim_front(capacity);
        let rethreaded = conv.assign_thread_ids();
        conv.refresh_cursors();

        self.prune_edits(&evicted);
        self.persist_message(&key, &msgid);
        for id in rethreaded.iter().filter(|id| **id != msgid) {
            self.persist_message(&key, id);
        }
        self.emit(BufferEvent::Appended {
            conversation: key,
            msgid,
        });
        true
    }

    /// Swap the oldest matching optimistic message for its server echo.
    ///
    /// A candidate has a local id and exactly the same sender nick and text.
    pub fn replace_optimistic(&mut self, msg: Message) -> bool {
        let key = fold_key(&msg.target);
        let Some(conv) = self.conversations.get_mut(&key) else {
            return false;
        };
        if !msg.is_local() && conv.position(&msg.msgid).is_some() {
            return false;
        }
        let Some(index) = conv
            .messages
            .iter()
            .position(|m| m.is_local() && m.nick == msg.nick && m.text == msg.text)
        else {
            return false;
        };

        let msgid = msg.msgid.clone();
        let local_id = std::mem::replace(&mut conv.messages[index], msg).msgid;
        let rethreaded = conv.assign_thread_ids();
        conv.refresh_cursors();

        self.submit(|| CacheOp::Remove {
            conversation: key.clone(),
            msgid: local_id.clone(),
        });
        self.persist_message(&key, &msgid);
        for id in rethreaded.iter().filter(|id| **id != msgid) {
            self.persist_message(&key, id);
        }
        self.emit(BufferEvent::Replaced {
            conversation: key,
            local_id,
            msgid,
        });
        true
    }

    /// Splice older history before the buffer.
    ///
    /// Overflow is trimmed from the newest end so the fetched history stays
    /// visible. Returns how many new messages were spliced in.
    pub fn prepend_batch(&mut self, conversation: &str, batch: Vec<Message>) -> usize {
        let key = fold_key(conversation);
        let count = self.splice(&key, conversation, batch, Side::Front);
        if count > 0 {
            self.persist_conversation(&key);
            self.emit(BufferEvent::Prepended {
                conversation: key,
                count,
            });
        }
        count
    }

    /// Splice newer history after the buffer; overflow evicts the oldest.
    pub fn append_batch(&mut self, conversation: &str, batch: Vec<Message>) -> usize {
        let key = fold_key(conversation);
        let count = self.splice(&key, conversation, batch, Side::Back);
        if count > 0 {
            self.persist_conversation(&key);
            self.emit(BufferEvent::BatchAppended {
                conversation: key,
                count,
            });
        }
        count
    }

    /// Seed a conversation from the persistent cache without writing back.
    pub(crate) fn restore(&mut self, conversation: &str, messages: Vec<Message>) -> usize {
        let key = fold_key(conversation);
        let display = messages
            .first()
            .map(|m| m.target.clone())
            .unwrap_or_else(|| conversation.to_string());
        let count = self.splice(&key, &display, messages, Side::Back);
        if count > 0 {
            self.emit(BufferEvent::Restored {
                conversation: key,
                count,
            });
        }
        count
    }

    pub(crate) fn restore_pins(&mut self, conversation: &str, pins: Vec<String>) {
        if pins.is_empty() {
            return;
        }
        let key = fold_key(conversation);
        self.pinned.entry(key.clone()).or_default().extend(pins);
        self.emit(BufferEvent::PinsChanged { conversation: key });
    }

    fn splice(&mut self, key: &str, display: &str, batch: Vec<Message>, side: Side) -> usize {
        let capacity = self.capacity;
        let conv = self
            .conversations
            .entry(key.to_string())
            .or_insert_with(|| Conversation::new(display));

        let fresh = conv.fresh(batch);
        let count = fresh.len();
        if count == 0 {
            return 0;
        }

        let evicted = match side {
            Side::Front => {
                let newer = std::mem::replace(&mut conv.messages, fresh);
                conv.messages.extend(newer);
                conv.trim_back(capacity)
            }
            Side::Back => {
                conv.messages.extend(fresh);
                conv.trim_front(capacity)
            }
        };
        conv.assign_thread_ids();
        conv.refresh_cursors();

        self.prune_edits(&evicted);
        count
    }

    /// Mark a message as redacted. The message stays buffered.
    pub fn redact(&mut self, conversation: &str, msgid: &str) -> bool {
        let key = fold_key(conversation);
        let Some(msg) = self.find_mut(&key, msgid) else {
            return false;
        };
        msg.redacted = true;

        self.persist_message(&key, msgid);
        self.emit(BufferEvent::Redacted {
            conversation: key,
            msgid: msgid.to_string(),
        });
        true
    }

    /// Apply an edit to a buffered message.
    ///
    /// `original` may be the buffered id or any id previously recorded as its
    /// replacement. The pre-edit text is appended to the edit history.
    pub fn edit(&mut self, conversation: &str, original: &str, new_text: &str, new_id: &str) -> bool {
        let key = fold_key(conversation);
        let buffered_id = if self.find(&key, original).is_some() {
            original.to_string()
        } else {
            self.edit_origin(original)
        };
        let Some(msg) = self.find_mut(&key, &buffered_id) else {
            return false;
        };

        let previous = std::mem::replace(&mut msg.text, new_text.to_string());
        msg.edit_history.get_or_insert_with(Vec::new).push(previous);
        msg.edited = true;

        if new_id != original {
            self.edit_chain.insert(original.to_string(), new_id.to_string());
        }

        self.persist_message(&key, &buffered_id);
        self.emit(BufferEvent::Edited {
            conversation: key,
            original: original.to_string(),
            new_id: new_id.to_string(),
        });
        true
    }

    /// Add `account` to the accounts that reacted with `emoji`.
    pub fn add_reaction(&mut self, conversation: &str, msgid: &str, emoji: &str, account: &str) -> bool {
        let key = fold_key(conversation);
        let Some(msg) = self.find_mut(&key, msgid) else {
            return false;
        };
        if !msg
            .reactions
            .entry(emoji.to_string())
            .or_default()
            .insert(account.to_string())
        {
            return false;
        }

        self.persist_message(&key, msgid);
        self.emit(BufferEvent::ReactionsChanged {
            conversation: key,
            msgid: msgid.to_string(),
        });
        true
    }

    /// Remove a reaction; an emoji with no accounts left disappears.
    pub fn remove_reaction(
        &mut self,
        conversation: &str,
        msgid: &str,
        emoji: &str,
        account: &str,
    ) -> bool {
        let key = fold_key(conversation);
        let Some(msg) = self.find_mut(&key, msgid) else {
            return false;
        };
        let Some(accounts) = msg.reactions.get_mut(emoji) else {
            return false;
        };
        if !accounts.remove(account) {
            return false;
        }
        if accounts.is_empty() {
            msg.reactions.remove(emoji);
        }

        self.persist_message(&key, msgid);
        self.emit(BufferEvent::ReactionsChanged {
            conversation: key,
            msgid: msgid.to_string(),
        });
        true
    }

    /// Update the delivery state of a message this client sent.
    pub fn set_send_state(&mut self, conversation: &str, msgid: &str, state: SendState) -> bool {
        let key = fold_key(conversation);
        let Some(msg) = self.find_mut(&key, msgid) else {
            return false;
        };
        if msg.send_state == Some(state) {
            return false;
        }
        msg.send_state = Some(state);

        self.persist_message(&key, msgid);
        self.emit(BufferEvent::SendStateChanged {
            conversation: key,
            msgid: msgid.to_string(),
        });
        true
    }

    /// Pin a message id. Works whether or not the message is buffered.
    pub fn pin(&mut self, conversation: &str, msgid: &str) -> bool {
        let key = fold_key(conversation);
        if !self.pinned.entry(key.clone()).or_default().insert(msgid.to_string()) {
            return false;
        }
        self.persist_pins(&key);
        self.emit(BufferEvent::PinsChanged { conversation: key });
        true
    }

    pub fn unpin(&mut self, conversation: &str, msgid: &str) -> bool {
        let key = fold_key(conversation);
        let Some(pins) = self.pinned.get_mut(&key) else {
            return false;
        };
        if !pins.remove(msgid) {
            return false;
        }
        if pins.is_empty() {
            self.pinned.remove(&key);
        }
        self.persist_pins(&key);
        self.emit(BufferEvent::PinsChanged { conversation: key });
        true
    }

    /// Drop a conversation's messages and cursors. Pins are kept.
    pub fn clear_conversation(&mut self, conversation: &str) {
        let key = fold_key(conversation);
        if let Some(conv) = self.conversations.remove(&key) {
            let ids: Vec<String> = conv.messages.into_iter().map(|m| m.msgid).collect();
            self.prune_edits(&ids);
        }
        self.submit(|| CacheOp::Clear {
            conversation: key.clone(),
        });
        self.emit(BufferEvent::Cleared { conversation: key });
    }

    /// Drop everything, pins included.
    pub fn clear_all(&mut self) {
        self.conversations.clear();
        self.edit_chain.clear();
        self.pinned.clear();
        self.submit(|| CacheOp::ClearAll);
        self.emit(BufferEvent::ClearedAll);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Buffered messages of a conversation, oldest first.
    pub fn messages(&self, conversation: &str) -> &[Message] {
        self.conversations
            .get(&fold_key(conversation))
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn message(&self, conversation: &str, msgid: &str) -> Option<&Message> {
        self.find(&fold_key(conversation), msgid)
    }

    pub fn cursors(&self, conversation: &str) -> Cursors {
        self.conversations
            .get(&fold_key(conversation))
            .map(|c| c.cursors.clone())
            .unwrap_or_default()
    }

    pub fn pinned(&self, conversation: &str) -> &BTreeSet<String> {
        self.pinned.get(&fold_key(conversation)).unwrap_or(&NO_PINS)
    }

    pub fn is_pinned(&self, conversation: &str, msgid: &str) -> bool {
        self.pinned(conversation).contains(msgid)
    }

    /// Display names of conversations with buffered state.
    pub fn conversations(&self) -> Vec<&str> {
        self.conversations.values().map(|c| c.name.as_str()).collect()
    }

    /// Follow the edit chain from `msgid` to the latest replacement id.
    pub fn resolve_edit(&self, msgid: &str) -> String {
        let mut current = msgid;
        let mut visited = HashSet::from([msgid]);
        for _ in 0..self.max_edit_hops {
            match self.edit_chain.get(current) {
                Some(next) if visited.insert(next.as_str()) => current = next.as_str(),
                _ => break,
            }
        }
        current.to_string()
    }

    pub fn thread_root(&self, conversation: &str, msgid: &str) -> String {
        thread::thread_root(self.messages(conversation), msgid)
    }

    pub fn thread(&self, conversation: &str, root: &str) -> Vec<&Message> {
        thread::thread(self.messages(conversation), root)
    }

    pub fn thread_count(&self, conversation: &str, root: &str) -> usize {
        thread::thread_count(self.messages(conversation), root)
    }

    pub fn has_thread(&self, conversation: &str, msgid: &str) -> bool {
        thread::has_thread(self.messages(conversation), msgid)
    }

    /// Search `conversation`, or the conversation named by an `in:` token.
    pub fn search(&self, conversation: &str, query: &str) -> Vec<&Message> {
        let query = SearchQuery::parse(query);
        let target = query.conversation.as_deref().unwrap_or(conversation);
        search::search(self.messages(target), &query)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn find(&self, key: &str, msgid: &str) -> Option<&Message> {
        self.conversations
            .get(key)?
            .messages
            .iter()
            .find(|m| m.msgid == msgid)
    }

    fn find_mut(&mut self, key: &str, msgid: &str) -> Option<&mut Message> {
        self.conversations
            .get_mut(key)?
            .messages
            .iter_mut()
            .find(|m| m.msgid == msgid)
    }

    /// Walk the edit chain backwards to the id a replacement descends from.
    fn edit_origin(&self, msgid: &str) -> String {
        let mut current = msgid.to_string();
        let mut visited = HashSet::from([current.clone()]);
        for _ in 0..self.max_edit_hops {
            let Some(previous) = self
                .edit_chain
                .iter()
                .find(|(_, next)| **next == current)
                .map(|(original, _)| original.clone())
            else {
                break;
            };
            if !visited.insert(previous.clone()) {
                break;
            }
            current = previous;
        }
        current
    }

    /// Drop the edit chains that start at evicted ids.
    fn prune_edits(&mut self, ids: &[String]) {
        for id in ids {
            let mut next = self.edit_chain.remove(id);
            for _ in 0..self.max_edit_hops {
                let Some(current) = next.take() else {
                    break;
                };
                next = self.edit_chain.remove(&current);
            }
        }
    }

    fn emit(&self, event: BufferEvent) {
        for observer in &self.observers {
            observer.on_change(&event);
        }
    }

    fn submit(&self, op: impl FnOnce() -> CacheOp) {
        if let Some(writer) = &self.writer {
            writer.submit(op());
        }
    }

    fn persist_message(&self, key: &str, msgid: &str) {
        if let Some(msg) = self.find(key, msgid) {
            self.submit(|| CacheOp::Upsert(codec::to_record(msg)));
        }
    }

    fn persist_conversation(&self, key: &str) {
        if let Some(conv) = self.conversations.get(key) {
            self.submit(|| CacheOp::Replace {
                conversation: key.to_string(),
                records: conv.messages.iter().map(codec::to_record).collect(),
            });
        }
    }

    fn persist_pins(&self, key: &str) {
        self.submit(|| CacheOp::SavePins {
            conversation: key.to_string(),
            pins: self.pinned(key).iter().cloned().collect(),
        });
    }
}
