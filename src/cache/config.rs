//! Cache configuration: per-data-class TTLs and capacity.

use std::num::NonZeroUsize;

use serde::Deserialize;
use time::Duration;

use super::keys::DataClass;

const DEFAULT_CAPACITY: usize = 4096;
const DEFAULT_THREAD_TTL_SECS: u64 = 5 * 60;
const DEFAULT_GATE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_RELATIONSHIP_TTL_SECS: u64 = 10 * 60;
const DEFAULT_FOLLOWING_TTL_SECS: u64 = 10 * 60;
const DEFAULT_LIST_MEMBERS_TTL_SECS: u64 = 10 * 60;

/// Cache tuning. TTLs bound staleness per data class; the assembled-thread
/// class is short because every write under a root changes its tree, while
/// gates change rarely and keep for an hour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum entries across all data classes.
    pub capacity: usize,
    pub thread_ttl_secs: u64,
    pub gate_ttl_secs: u64,
    pub relationship_ttl_secs: u64,
    pub following_ttl_secs: u64,
    pub list_members_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            thread_ttl_secs: DEFAULT_THREAD_TTL_SECS,
            gate_ttl_secs: DEFAULT_GATE_TTL_SECS,
            relationship_ttl_secs: DEFAULT_RELATIONSHIP_TTL_SECS,
            following_ttl_secs: DEFAULT_FOLLOWING_TTL_SECS,
            list_members_ttl_secs: DEFAULT_LIST_MEMBERS_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self, class: DataClass) -> Duration {
        let secs = match class {
            DataClass::Thread => self.thread_ttl_secs,
            DataClass::Gate => self.gate_ttl_secs,
            DataClass::Relationships => self.relationship_ttl_secs,
            DataClass::Following => self.following_ttl_secs,
            DataClass::ListMembers => self.list_members_ttl_secs,
        };
        Duration::seconds(secs as i64)
    }

    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_data_class_guidance() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(DataClass::Thread), Duration::minutes(5));
        assert_eq!(config.ttl(DataClass::Gate), Duration::hours(1));
        assert_eq!(config.ttl(DataClass::Relationships), Duration::minutes(10));
        assert_eq!(config.ttl(DataClass::Following), Duration::minutes(10));
        assert_eq!(config.ttl(DataClass::ListMembers), Duration::minutes(10));
    }

    #[test]
    fn capacity_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
