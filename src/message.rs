//! Client-side chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Reserved id prefix for optimistic messages awaiting their server echo.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Emoji -> accounts that reacted with it.
pub type Reactions = HashMap<String, HashSet<String>>;

/// What kind of event a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Privmsg,
    Notice,
    Action,
    Join,
    Part,
    Quit,
    Kick,
    Nick,
    Mode,
    Topic,
}

impl MessageKind {
    /// Whether this kind carries user-authored content (as opposed to a
    /// membership or channel state change).
    pub fn is_content(self) -> bool {
        matches!(self, Self::Privmsg | Self::Notice | Self::Action)
    }
}

/// Delivery state of a message this client originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Pending,
    Sent,
    Failed,
}

/// One chat event in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msgid: String,
    /// Sender nickname.
    pub nick: String,
    /// Sender account, if logged in.
    pub account: Option<String>,
    /// Conversation this message belongs to (display casing).
    pub target: String,
    pub text: String,
    pub time: DateTime<Utc>,
    /// IRCv3 message tags.
    pub tags: BTreeMap<String, String>,
    /// Parent message for replies.
    pub reply_to: Option<String>,
    /// Root of the reply chain, filled in when the message is buffered.
    pub thread_id: Option<String>,
    pub reactions: Reactions,
    pub redacted: bool,
    pub edited: bool,
    /// Prior text versions, oldest first. `None` until the first edit.
    pub edit_history: Option<Vec<String>>,
    pub kind: MessageKind,
    /// Only set for messages this client sent.
    pub send_state: Option<SendState>,
}

impl Message {
    /// Create a plain PRIVMSG-style message.
    pub fn new(
        msgid: impl Into<String>,
        nick: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            msgid: msgid.into(),
            nick: nick.into(),
            account: None,
            target: target.into(),
            text: text.into(),
            time,
            tags: BTreeMap::new(),
            reply_to: None,
            thread_id: None,
            reactions: HashMap::new(),
            redacted: false,
            edited: false,
            edit_history: None,
            kind: MessageKind::Privmsg,
            send_state: None,
        }
    }

    /// Create an optimistic message for text this client is about to send.
    ///
    /// The id carries [`LOCAL_ID_PREFIX`] so the server echo can replace it.
    pub fn local(nick: impl Into<String>, target: impl Into<String>, text: impl Into<String>) -> Self {
        let msgid = format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4());
        let mut msg = Self::new(msgid, nick, target, text, Utc::now());
        msg.send_state = Some(SendState::Pending);
        msg
    }

    /// Whether this message still has a locally generated id.
    pub fn is_local(&self) -> bool {
        is_local_id(&self.msgid)
    }

    pub fn with_reply_to(mut self, parent: impl Into<String>) -> Self {
        self.reply_to = Some(parent.into());
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

/// Whether an id was generated locally for an optimistic message.
pub fn is_local_id(msgid: &str) -> bool {
    msgid.starts_with(LOCAL_ID_PREFIX)
}
