//! Cache key definitions.
//!
//! Keys are namespaced by data class and carry the viewer identity whenever
//! the cached value is viewer-sensitive. `KeySelector` is the invalidation
//! side: an exact key or a class-scoped pattern the store sweeps.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::ids::{AtUri, Did};

/// Data class a cache entry belongs to. Determines its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataClass {
    Thread,
    Gate,
    Relationships,
    Following,
    ListMembers,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Assembled thread for one root, viewer, and parameter set.
    Thread {
        root: AtUri,
        viewer: Option<Did>,
        params_hash: u64,
    },
    /// Thread gate of a root post. Viewer-independent.
    Gate { post: AtUri },
    /// Pairwise viewer/author relationship row.
    Relationships { viewer: Did, author: Did },
    /// The viewer's following set.
    Following { viewer: Did },
    /// Member DIDs of a list. Viewer-independent.
    ListMembers { list: AtUri },
}

impl CacheKey {
    pub fn class(&self) -> DataClass {
        match self {
            CacheKey::Thread { .. } => DataClass::Thread,
            CacheKey::Gate { .. } => DataClass::Gate,
            CacheKey::Relationships { .. } => DataClass::Relationships,
            CacheKey::Following { .. } => DataClass::Following,
            CacheKey::ListMembers { .. } => DataClass::ListMembers,
        }
    }
}

/// Invalidation target: one key, or every key matching a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
    Exact(CacheKey),
    /// All assembled threads under a root, for every viewer and parameter set.
    ThreadsOfRoot(AtUri),
    /// Both orientations of a relationship pair.
    RelationshipPair(Did, Did),
}

impl KeySelector {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeySelector::Exact(exact) => key == exact,
            KeySelector::ThreadsOfRoot(root) => {
                matches!(key, CacheKey::Thread { root: r, .. } if r == root)
            }
            KeySelector::RelationshipPair(a, b) => matches!(
                key,
                CacheKey::Relationships { viewer, author }
                    if (viewer == a && author == b) || (viewer == b && author == a)
            ),
        }
    }
}

/// Compute a stable hash for any hashable value. Used to fold thread
/// parameters into the cache key.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
