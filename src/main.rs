//! slirc-store - inspect a persisted message cache.
//!
//! Usage: `slirc-store [config.toml] [query...]`
//!
//! Hydrates a message store from the configured cache, logs a summary per
//! conversation and, when a query is given, searches every conversation.

use slirc_store::cache::noop::NoOpCache;
use slirc_store::cache::redb::RedbCache;
use slirc_store::{CacheProvider, CacheWriter, Config, MessageStore, hydrate};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let query = args.collect::<Vec<_>>().join(" ");

    let config = if config_path == DEFAULT_CONFIG_PATH && !Path::new(&config_path).exists() {
        info!("No config.toml found, using defaults");
        Config::default()
    } else {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    };

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let cache: Arc<dyn CacheProvider> = if config.cache.enabled {
        info!(path = %config.cache.path, limit = config.cache.per_conversation_limit, "Using message cache");
        Arc::new(RedbCache::with_limit(
            &config.cache.path,
            config.cache.per_conversation_limit,
        ))
    } else {
        warn!("Message cache disabled, history starts empty");
        Arc::new(NoOpCache)
    };

    let mut store = MessageStore::from_config(&config.buffer);
    let hydrated = hydrate(&mut store, cache.as_ref()).await;

    // Live mutations are written through only after hydration.
    let mut store = store.with_writer(CacheWriter::spawn_with(
        cache,
        config.cache.queue_capacity,
        None,
    ));

    for conversation in &hydrated {
        let cursors = store.cursors(conversation);
        info!(
            conversation = %conversation,
            messages = store.messages(conversation).len(),
            pinned = store.pinned(conversation).len(),
            oldest = ?cursors.oldest,
            newest = ?cursors.newest,
            "Conversation"
        );
    }

    if !query.is_empty() {
        for conversation in &hydrated {
            for msg in store.search(conversation, &query) {
                info!(
                    conversation = %conversation,
                    msgid = %msg.msgid,
                    nick = %msg.nick,
                    time = %msg.time,
                    "{}",
                    msg.text
                );
            }
        }
    }

    if let Some(writer) = store.take_writer() {
        writer.close().await;
    }
    Ok(())
}
