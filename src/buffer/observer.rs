//! Change notifications for buffer consumers.
//!
//! A UI, a test, or any other consumer registers a [`BufferObserver`] and is
//! told about every mutation after it has been applied.

/// A mutation that has been applied to the buffer.
///
/// Conversation keys are folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    Appended { conversation: String, msgid: String },
    Replaced { conversation: String, local_id: String, msgid: String },
    Prepended { conversation: String, count: usize },
    BatchAppended { conversation: String, count: usize },
    Redacted { conversation: String, msgid: String },
    Edited { conversation: String, original: String, new_id: String },
    ReactionsChanged { conversation: String, msgid: String },
    SendStateChanged { conversation: String, msgid: String },
    PinsChanged { conversation: String },
    Restored { conversation: String, count: usize },
    Cleared { conversation: String },
    ClearedAll,
}

impl BufferEvent {
    /// The conversation this event touched, or `None` for a full reset.
    pub fn conversation(&self) -> Option<&str> {
        match self {
            Self::Appended { conversation, .. }
            | Self::Replaced { conversation, .. }
            | Self::Prepended { conversation, .. }
            | Self::BatchAppended { conversation, .. }
            | Self::Redacted { conversation, .. }
            | Self::Edited { conversation, .. }
            | Self::ReactionsChanged { conversation, .. }
            | Self::SendStateChanged { conversation, .. }
            | Self::PinsChanged { conversation }
            | Self::Restored { conversation, .. }
            | Self::Cleared { conversation } => Some(conversation),
            Self::ClearedAll => None,
        }
    }
}

pub trait BufferObserver: Send + Sync {
    /// Called synchronously after each mutation.
    fn on_change(&self, event: &BufferEvent);
}
