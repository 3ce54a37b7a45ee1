//! Cache storage.
//!
//! `CacheStore` is the collaborator seam: a remote backend implements it and
//! swallows its own transport failures (an unreachable cache behaves as
//! all-miss, never as an error). `MemoryCache` is the in-process
//! implementation: one LRU map with per-entry TTL checked against the
//! injected clock.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::util::clock::Clock;

use super::config::CacheConfig;
use super::keys::{CacheKey, KeySelector};
use super::lock::rw_write;

const SOURCE: &str = "cache::store";

/// Key-value cache with TTL semantics. Implementations must be safe to treat
/// as pure optimization: any operation may silently do nothing.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Value>;
    fn set(&self, key: CacheKey, value: Value, ttl: Duration);
    fn remove(&self, selector: &KeySelector);
}

/// Typed read. Deserialization failures count as misses and are logged; a
/// corrupt entry must never fail the request it was meant to speed up.
pub fn get_typed<T: DeserializeOwned>(cache: &dyn CacheStore, key: &CacheKey) -> Option<T> {
    let value = cache.get(key)?;
    match serde_json::from_value(value) {
        Ok(typed) => Some(typed),
        Err(err) => {
            warn!(?key, error = %err, "Discarding undecodable cache entry");
            cache.remove(&KeySelector::Exact(key.clone()));
            None
        }
    }
}

/// Typed write. Serialization failures are logged and skipped.
pub fn set_typed<T: Serialize>(cache: &dyn CacheStore, key: CacheKey, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(serialized) => cache.set(key, serialized, ttl),
        Err(err) => warn!(?key, error = %err, "Skipping unserializable cache entry"),
    }
}

struct Entry {
    value: Value,
    expires_at: OffsetDateTime,
}

/// In-memory TTL + LRU cache.
pub struct MemoryCache {
    entries: RwLock<LruCache<CacheKey, Entry>>,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            clock,
            enabled: config.enabled,
        }
    }

    pub fn len(&self) -> usize {
        rw_write(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                counter!("skyview_cache_hit_total").increment(1);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(key);
                counter!("skyview_cache_expired_total").increment(1);
                None
            }
            None => {
                counter!("skyview_cache_miss_total").increment(1);
                None
            }
        }
    }

    fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let entry = Entry {
            value,
            expires_at: self.clock.now() + ttl,
        };
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        // push returns the displaced pair; it is only an LRU eviction when
        // the displaced entry belongs to a different key.
        if let Some((displaced, _)) = entries.push(key.clone(), entry)
            && displaced != key
        {
            counter!("skyview_cache_evict_total").increment(1);
        }
    }

    fn remove(&self, selector: &KeySelector) {
        let mut entries = rw_write(&self.entries, SOURCE, "remove");
        match selector {
            KeySelector::Exact(key) => {
                entries.pop(key);
            }
            _ => {
                let matched: Vec<CacheKey> = entries
                    .iter()
                    .filter(|(key, _)| selector.matches(key))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in matched {
                    entries.pop(&key);
                }
            }
        }
    }
}
