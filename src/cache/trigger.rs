//! Write-path invalidation hooks.
//!
//! Every mutating operation elsewhere in the system calls the matching hook
//! synchronously as part of completing its write. Each hook publishes one
//! event and consumes the queue immediately so the next read observes the
//! change.

use std::sync::Arc;

use crate::domain::ids::{AtUri, Did};

use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

pub struct CacheTrigger {
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self { queue, consumer }
    }

    fn publish_and_consume(&self, kind: EventKind) {
        self.queue.publish(kind);
        self.consumer.consume();
    }

    /// `root` is the thread root when the created post is a reply.
    pub fn on_post_created(&self, uri: &AtUri, root: Option<&AtUri>) {
        self.publish_and_consume(EventKind::PostCreated {
            uri: uri.clone(),
            root: root.cloned(),
        });
    }

    pub fn on_post_deleted(&self, uri: &AtUri, root: Option<&AtUri>) {
        self.publish_and_consume(EventKind::PostDeleted {
            uri: uri.clone(),
            root: root.cloned(),
        });
    }

    pub fn on_block_changed(&self, a: &Did, b: &Did) {
        self.publish_and_consume(EventKind::BlockChanged {
            a: a.clone(),
            b: b.clone(),
        });
    }

    pub fn on_mute_changed(&self, a: &Did, b: &Did) {
        self.publish_and_consume(EventKind::MuteChanged {
            a: a.clone(),
            b: b.clone(),
        });
    }

    pub fn on_follow_changed(&self, follower: &Did, subject: &Did) {
        self.publish_and_consume(EventKind::FollowChanged {
            follower: follower.clone(),
            subject: subject.clone(),
        });
    }

    pub fn on_list_item_changed(&self, list: &AtUri) {
        self.publish_and_consume(EventKind::ListItemChanged { list: list.clone() });
    }

    pub fn on_thread_gate_changed(&self, post: &AtUri) {
        self.publish_and_consume(EventKind::ThreadGateChanged { post: post.clone() });
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::cache::config::CacheConfig;
    use crate::cache::store::MemoryCache;
    use crate::util::clock::ManualClock;

    use super::*;

    fn trigger() -> CacheTrigger {
        let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 12:00 UTC)));
        let store = Arc::new(MemoryCache::new(&CacheConfig::default(), clock));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(store, queue.clone()));
        CacheTrigger::new(queue, consumer)
    }

    #[test]
    fn hooks_publish_and_consume_synchronously() {
        let trigger = trigger();
        let uri =
            AtUri::new("at://did:plc:author1/app.bsky.feed.post/3k1").expect("valid uri");
        let a = Did::new("did:plc:aaa1").expect("valid did");
        let b = Did::new("did:plc:bbb1").expect("valid did");

        trigger.on_post_created(&uri, None);
        trigger.on_post_deleted(&uri, Some(&uri));
        trigger.on_block_changed(&a, &b);
        trigger.on_mute_changed(&a, &b);
        trigger.on_follow_changed(&a, &b);
        trigger.on_thread_gate_changed(&uri);

        // Every hook consumes its own event before returning.
        assert!(trigger.queue().is_empty());
    }
}
