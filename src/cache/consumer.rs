//! Cache event consumer.
//!
//! Drains the event queue and translates each event into the cache-key
//! sweeps that keep reads correct after a write.

use std::sync::Arc;

use tracing::debug;

use super::events::{CacheEvent, EventKind, EventQueue};
use super::keys::{CacheKey, KeySelector};
use super::store::CacheStore;

const DEFAULT_BATCH_LIMIT: usize = 100;

pub struct CacheConsumer {
    store: Arc<dyn CacheStore>,
    queue: Arc<EventQueue>,
    batch_limit: usize,
}

impl CacheConsumer {
    pub fn new(store: Arc<dyn CacheStore>, queue: Arc<EventQueue>) -> Self {
        Self {
            store,
            queue,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Drain pending events and apply their invalidations. Returns the number
    /// of events consumed.
    pub fn consume(&self) -> usize {
        let events = self.queue.drain(self.batch_limit);
        for event in &events {
            self.apply(event);
        }
        events.len()
    }

    fn apply(&self, event: &CacheEvent) {
        let selectors = selectors_for(&event.kind);
        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            selector_count = selectors.len(),
            "Applying cache invalidation"
        );
        for selector in selectors {
            self.store.remove(&selector);
        }
    }
}

/// The keys staled by one event.
///
/// Assembled threads are memoized per thread root, so a post event sweeps the
/// root's entries once and thereby covers every ancestor whose rendered
/// children changed.
fn selectors_for(kind: &EventKind) -> Vec<KeySelector> {
    match kind {
        EventKind::PostCreated { uri, root } | EventKind::PostDeleted { uri, root } => {
            vec![KeySelector::ThreadsOfRoot(
                root.clone().unwrap_or_else(|| uri.clone()),
            )]
        }
        EventKind::BlockChanged { a, b } | EventKind::MuteChanged { a, b } => {
            vec![KeySelector::RelationshipPair(a.clone(), b.clone())]
        }
        EventKind::FollowChanged { follower, subject } => vec![
            KeySelector::RelationshipPair(follower.clone(), subject.clone()),
            KeySelector::Exact(CacheKey::Following {
                viewer: follower.clone(),
            }),
        ],
        EventKind::ListItemChanged { list } => vec![KeySelector::Exact(CacheKey::ListMembers {
            list: list.clone(),
        })],
        EventKind::ThreadGateChanged { post } => vec![
            KeySelector::Exact(CacheKey::Gate { post: post.clone() }),
            KeySelector::ThreadsOfRoot(post.clone()),
        ],
    }
}
