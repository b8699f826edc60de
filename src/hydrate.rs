//! Cold-start hydration of the message buffer from the persistent cache.
//!
//! Runs once, before live events are delivered, so stale disk reads never
//! interleave with fresh writes.

use crate::buffer::MessageStore;
use crate::cache::CacheProvider;
use crate::codec;
use crate::telemetry::spans;
use tracing::{Instrument, debug, info, warn};

/// Seed `store` with every cached conversation.
///
/// Returns the keys of conversations that received at least one message.
/// An unavailable cache yields an empty list; corrupt records and
/// conversations that fail to load are skipped.
pub async fn hydrate(store: &mut MessageStore, cache: &dyn CacheProvider) -> Vec<String> {
    hydrate_inner(store, cache).instrument(spans::hydrate()).await
}

async fn hydrate_inner(store: &mut MessageStore, cache: &dyn CacheProvider) -> Vec<String> {
    let conversations = match cache.conversations().await {
        Ok(conversations) => conversations,
        Err(e) if e.is_unavailable() => {
            debug!(error = %e, "Cache unavailable, starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to list cached conversations");
            return Vec::new();
        }
    };

    let mut hydrated = Vec::new();
    for conversation in conversations {
        let records = match cache.load_conversation(&conversation).await {
            Ok(records) => records,
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "Skipping unreadable conversation");
                continue;
            }
        };

        let messages: Vec<_> = records
            .into_iter()
            .filter_map(|record| {
                let msgid = record.msgid.clone();
                codec::from_record(record)
                    .inspect_err(|e| {
                        warn!(conversation = %conversation, msgid = %msgid, error = %e, "Skipping corrupt cached record");
                    })
                    .ok()
            })
            .collect();

        if store.restore(&conversation, messages) > 0 {
            hydrated.push(conversation);
        }
    }

    match cache.load_pins().await {
        Ok(pins) => {
            for (conversation, ids) in pins {
                store.restore_pins(&conversation, ids);
            }
        }
        Err(e) => warn!(error = %e, "Failed to load pinned messages"),
    }

    info!(conversations = hydrated.len(), "Hydrated message store from cache");
    hydrated
}
