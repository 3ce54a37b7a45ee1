//! Skyview: view hydration and thread assembly for a federated social
//! network.
//!
//! The crate turns stored records into protocol view objects: `Hydrator`
//! batches every lookup a request needs into a constant number of concurrent
//! store calls, `ThreadAssembler` builds bounded, viewer-aware reply trees on
//! top of that state, and the `presentation` layer serializes views without
//! performing any I/O. An event-invalidated TTL cache memoizes assembled
//! threads per thread root.
//!
//! Storage is a collaborator: callers implement [`application::RecordStore`]
//! and the engine stays read-only.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod presentation;
pub mod util;

pub use application::{
    EngineError, HydrationState, Hydrator, RecordStore, SortMode, ThreadAssembler, ThreadParams,
};
pub use cache::{CacheConfig, CacheConsumer, CacheStore, CacheTrigger, EventQueue, MemoryCache};
pub use config::{Settings, ThreadSettings};
