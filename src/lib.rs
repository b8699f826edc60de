//! slirc-store - client-side message store for the slirc chat client.
//!
//! A bounded in-memory buffer of messages per conversation with threads,
//! edits, reactions, pins and search, backed by a best-effort redb cache that
//! is written through on every mutation and read once at cold start.

pub mod buffer;
pub mod cache;
pub mod casemap;
pub mod codec;
pub mod config;
pub mod hydrate;
pub mod message;
pub mod telemetry;

pub use buffer::{BufferEvent, BufferObserver, Cursors, MessageStore, SearchQuery};
pub use cache::{CacheError, CacheProvider, CacheWriter};
pub use config::Config;
pub use hydrate::hydrate;
pub use message::{Message, MessageKind, SendState};
