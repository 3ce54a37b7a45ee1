//! Cache invalidation events.
//!
//! Write-path code publishes one event per mutation; the consumer maps each
//! event onto the cache keys it staled. Events carry an idempotency id and a
//! monotonic epoch so a future remote transport can dedupe and order them.

use std::collections::VecDeque;
use std::sync::Mutex;

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::ids::{AtUri, Did};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency.
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

/// Mutations that stale cached data.
///
/// Post events carry the thread root when the post is a reply; the write path
/// has the record in hand and the root locates every cached tree the post
/// appears in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    PostCreated { uri: AtUri, root: Option<AtUri> },
    PostDeleted { uri: AtUri, root: Option<AtUri> },
    BlockChanged { a: Did, b: Did },
    MuteChanged { a: Did, b: Did },
    FollowChanged { follower: Did, subject: Did },
    ListItemChanged { list: AtUri },
    ThreadGateChanged { post: AtUri },
}

/// In-memory FIFO event queue.
///
/// The epoch counter lives under the same mutex as the queue, so an event's
/// epoch order always matches its queue position.
#[derive(Default)]
pub struct EventQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<CacheEvent>,
    next_epoch: Epoch,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event and return the epoch it was assigned.
    pub fn publish(&self, kind: EventKind) -> Epoch {
        let mut state = mutex_lock(&self.state, SOURCE, "publish");
        let epoch = state.next_epoch;
        state.next_epoch += 1;

        let event = CacheEvent {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        };
        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );
        state.events.push_back(event);
        epoch
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut state = mutex_lock(&self.state, SOURCE, "drain");
        let count = limit.min(state.events.len());
        state.events.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_uri(rkey: &str) -> AtUri {
        AtUri::new(format!("at://did:plc:author1/app.bsky.feed.post/{rkey}")).expect("valid uri")
    }

    #[test]
    fn epochs_increase_in_publish_order() {
        let queue = EventQueue::new();
        let e1 = queue.publish(EventKind::ThreadGateChanged {
            post: post_uri("3k1"),
        });
        let e2 = queue.publish(EventKind::ThreadGateChanged {
            post: post_uri("3k2"),
        });
        assert!(e1 < e2);

        let events = queue.drain(10);
        assert_eq!(events[0].epoch, e1);
        assert_eq!(events[1].epoch, e2);
    }

    #[test]
    fn drain_is_fifo_and_bounded() {
        let queue = EventQueue::new();
        queue.publish(EventKind::PostCreated {
            uri: post_uri("3k1"),
            root: None,
        });
        queue.publish(EventKind::ThreadGateChanged {
            post: post_uri("3k1"),
        });
        queue.publish(EventKind::ListItemChanged {
            list: AtUri::new("at://did:plc:author1/app.bsky.graph.list/mods").expect("valid uri"),
        });

        assert_eq!(queue.len(), 3);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert!(matches!(events[0].kind, EventKind::PostCreated { .. }));
        assert!(matches!(events[1].kind, EventKind::ThreadGateChanged { .. }));
    }

    #[test]
    fn drain_more_than_available() {
        let queue = EventQueue::new();
        queue.publish(EventKind::PostDeleted {
            uri: post_uri("3k1"),
            root: Some(post_uri("3k0")),
        });

        let events = queue.drain(100);
        assert_eq!(events.len(), 1);
        assert!(queue.is_empty());
    }
}
