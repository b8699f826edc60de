//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: The top-level [`Config`] and [`ConfigError`]
//! - [`buffer`]: In-memory buffer limits (BufferConfig)
//! - [`cache`]: Persistent message cache settings (CacheConfig)
//! - [`validation`]: Startup checks for values that would make the store useless

mod buffer;
mod cache;
mod types;
pub mod validation;

pub use buffer::BufferConfig;
pub use cache::CacheConfig;
pub use types::{Config, ConfigError};
pub use validation::ValidationError;
