//! Event-invalidated TTL cache.
//!
//! The cache is strictly an optimization: disabling it changes latency, never
//! results. Entries are namespaced by data class, viewer-scoped where the
//! value depends on who is looking, and dropped either by TTL or by an
//! explicit event from the write path.

mod config;
mod consumer;
mod events;
mod keys;
mod lock;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use keys::{CacheKey, DataClass, KeySelector, hash_value};
pub use store::{CacheStore, MemoryCache, get_typed, set_typed};
pub use trigger::CacheTrigger;
