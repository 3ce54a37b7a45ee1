//! Thread assembly tests: tree shape, ordering, gating, moderation, bounding,
//! and memoization through the event-invalidated cache.

mod support;

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use skyview::application::{EngineError, Hydrator, SortMode, ThreadAssembler, ThreadParams};
use skyview::cache::{CacheConfig, CacheConsumer, CacheTrigger, EventQueue, MemoryCache};
use skyview::config::ThreadSettings;
use skyview::domain::ids::ContentRef;
use skyview::domain::records::{Facet, RecordValue, ThreadGateRecord, ThreadGateRule};
use skyview::domain::views::{ThreadNode, ThreadNodeKind};
use skyview::util::clock::SystemClock;

use support::{StubStore, block_relationship, did, follow_relationship, post, post_uri, reply};

const ROOT_AUTHOR: &str = "did:plc:root1";
const FRIEND: &str = "did:plc:friend1";
const STRANGER: &str = "did:plc:stranger1";
const VIEWER: &str = "did:plc:viewer1";

fn cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new(
        &CacheConfig::default(),
        Arc::new(SystemClock),
    ))
}

fn assembler(store: Arc<StubStore>, cache: Arc<MemoryCache>) -> ThreadAssembler {
    support::init_tracing();
    let hydrator = Arc::new(Hydrator::new(
        store.clone(),
        cache.clone(),
        CacheConfig::default(),
        Duration::from_secs(1),
    ));
    ThreadAssembler::new(
        hydrator,
        store,
        cache,
        CacheConfig::default(),
        ThreadSettings::default(),
        Url::parse("https://cdn.example.com").expect("valid base url"),
    )
}

fn anchor(author: &str, rkey: &str) -> ContentRef {
    ContentRef::new(post_uri(author, rkey))
}

fn child_rkeys(node: &ThreadNode) -> Vec<&str> {
    node.children.iter().map(|child| child.uri.rkey()).collect()
}

/// Root plus three replies by friend (m1), stranger (m2), root author (m3).
fn flat_thread() -> StubStore {
    let mut store = StubStore::new();
    let root = post_uri(ROOT_AUTHOR, "root");
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    store.add_post(reply(FRIEND, "c1", 1, &root, &root));
    store.add_post(reply(STRANGER, "c2", 2, &root, &root));
    store.add_post(reply(ROOT_AUTHOR, "c3", 3, &root, &root));
    store
}

#[tokio::test]
async fn missing_anchor_is_not_found() {
    let store = Arc::new(StubStore::new());
    let result = assembler(store, cache())
        .assemble(&anchor(ROOT_AUTHOR, "gone"), &ThreadParams::default(), None)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound)));
}

#[tokio::test]
async fn anchor_of_blocking_author_is_refused() {
    let mut store = flat_thread();
    store
        .relationships
        .insert(did(ROOT_AUTHOR), block_relationship(VIEWER));
    let store = Arc::new(store);

    let viewer = did(VIEWER);
    let result = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams::default(),
            Some(&viewer),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Blocked)));
}

#[tokio::test]
async fn single_post_yields_a_leaf() {
    let mut store = StubStore::new();
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("assembled thread");

    assert_eq!(tree.uri, post_uri(ROOT_AUTHOR, "root"));
    assert!(matches!(tree.kind, ThreadNodeKind::Post { .. }));
    assert!(tree.children.is_empty());
}

#[tokio::test]
async fn ancestors_chain_from_root_down_to_anchor() {
    let mut store = StubStore::new();
    let root = post_uri(ROOT_AUTHOR, "root");
    let mid = post_uri(FRIEND, "mid");
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    store.add_post(reply(FRIEND, "mid", 1, &root, &root));
    store.add_post(reply(STRANGER, "leaf", 2, &root, &mid));
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(&anchor(STRANGER, "leaf"), &ThreadParams::default(), None)
        .await
        .expect("assembled thread");

    assert_eq!(tree.uri, root);
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].uri, mid);
    assert_eq!(tree.children[0].children[0].uri, post_uri(STRANGER, "leaf"));
}

#[tokio::test]
async fn missing_ancestor_becomes_a_placeholder() {
    let mut store = StubStore::new();
    let root = post_uri(ROOT_AUTHOR, "root");
    let mid = post_uri(FRIEND, "mid");
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    // `mid` is never stored; the leaf still points at it.
    store.add_post(reply(STRANGER, "leaf", 2, &root, &mid));
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(&anchor(STRANGER, "leaf"), &ThreadParams::default(), None)
        .await
        .expect("assembled thread");

    // Root resolved through the reply.root pointer, placeholder in between.
    assert_eq!(tree.uri, root);
    let placeholder = &tree.children[0];
    assert_eq!(placeholder.uri, mid);
    assert!(matches!(placeholder.kind, ThreadNodeKind::NotFound));
    assert_eq!(placeholder.children[0].uri, post_uri(STRANGER, "leaf"));
}

#[tokio::test]
async fn blocked_ancestor_is_a_placeholder_and_the_walk_continues() {
    let mut store = StubStore::new();
    let root = post_uri(ROOT_AUTHOR, "root");
    let mid = post_uri(FRIEND, "mid");
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    store.add_post(reply(FRIEND, "mid", 1, &root, &root));
    store.add_post(reply(STRANGER, "leaf", 2, &root, &mid));
    store
        .relationships
        .insert(did(FRIEND), block_relationship(VIEWER));
    let store = Arc::new(store);

    let viewer = did(VIEWER);
    let tree = assembler(store, cache())
        .assemble(
            &anchor(STRANGER, "leaf"),
            &ThreadParams::default(),
            Some(&viewer),
        )
        .await
        .expect("assembled thread");

    // The blocked parent keeps its place in the chain, body withheld, and the
    // walk still reaches the root above it.
    assert_eq!(tree.uri, root);
    let tombstone = &tree.children[0];
    assert_eq!(tombstone.uri, mid);
    assert!(matches!(
        tombstone.kind,
        ThreadNodeKind::Blocked { ref author } if author == &did(FRIEND)
    ));
    assert_eq!(tombstone.children[0].uri, post_uri(STRANGER, "leaf"));
}

#[tokio::test]
async fn sort_modes_order_siblings_deterministically() {
    let mut store = flat_thread();
    store.set_likes(&post_uri(STRANGER, "c2"), 5);
    let store = Arc::new(store);
    let assembler = assembler(store, cache());
    let anchor = anchor(ROOT_AUTHOR, "root");

    let oldest = assembler
        .assemble(
            &anchor,
            &ThreadParams {
                sort: SortMode::Oldest,
                ..Default::default()
            },
            None,
        )
        .await
        .expect("oldest order");
    assert_eq!(child_rkeys(&oldest), ["c1", "c2", "c3"]);

    let newest = assembler
        .assemble(
            &anchor,
            &ThreadParams {
                sort: SortMode::Newest,
                ..Default::default()
            },
            None,
        )
        .await
        .expect("newest order");
    assert_eq!(child_rkeys(&newest), ["c3", "c2", "c1"]);

    // Top: likes first, then recency.
    let top = assembler
        .assemble(
            &anchor,
            &ThreadParams {
                sort: SortMode::Top,
                ..Default::default()
            },
            None,
        )
        .await
        .expect("top order");
    assert_eq!(child_rkeys(&top), ["c2", "c3", "c1"]);
}

#[tokio::test]
async fn branching_factor_truncates_after_sorting() {
    let store = Arc::new(flat_thread());

    let tree = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams {
                branching_factor: 2,
                sort: SortMode::Oldest,
                ..Default::default()
            },
            None,
        )
        .await
        .expect("assembled thread");

    assert_eq!(child_rkeys(&tree), ["c1", "c2"]);
}

#[tokio::test]
async fn depth_bounds_the_reply_tree() {
    let mut store = StubStore::new();
    let root = post_uri(ROOT_AUTHOR, "root");
    let r1 = post_uri(FRIEND, "r1");
    let r2 = post_uri(STRANGER, "r2");
    store.add_post(post(ROOT_AUTHOR, "root", 0));
    store.add_post(reply(FRIEND, "r1", 1, &root, &root));
    store.add_post(reply(STRANGER, "r2", 2, &root, &r1));
    store.add_post(reply(FRIEND, "r3", 3, &root, &r2));
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams {
                depth: 2,
                ..Default::default()
            },
            None,
        )
        .await
        .expect("assembled thread");

    let level1 = &tree.children[0];
    let level2 = &level1.children[0];
    assert_eq!(level2.uri, r2);
    assert!(level2.children.is_empty());
}

#[tokio::test]
async fn followed_authors_are_promoted_stably() {
    let mut store = flat_thread();
    store
        .relationships
        .insert(did(FRIEND), follow_relationship(VIEWER));
    let store = Arc::new(store);

    let viewer = did(VIEWER);
    let tree = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams {
                sort: SortMode::Newest,
                prioritize_followed: true,
                ..Default::default()
            },
            Some(&viewer),
        )
        .await
        .expect("assembled thread");

    // Newest order is c3, c2, c1; the followed author's c1 moves to the
    // front without reordering the rest.
    assert_eq!(child_rkeys(&tree), ["c1", "c3", "c2"]);
}

#[tokio::test]
async fn blocked_reply_author_becomes_a_childless_tombstone() {
    let mut store = flat_thread();
    // A grandchild under the stranger's reply, dropped with its parent.
    let c2 = post_uri(STRANGER, "c2");
    let root = post_uri(ROOT_AUTHOR, "root");
    store.add_post(reply(FRIEND, "under-c2", 4, &root, &c2));
    store
        .relationships
        .insert(did(STRANGER), block_relationship(VIEWER));
    let store = Arc::new(store);

    let viewer = did(VIEWER);
    let tree = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams::default(),
            Some(&viewer),
        )
        .await
        .expect("assembled thread");

    let tombstone = tree
        .children
        .iter()
        .find(|child| child.uri == c2)
        .expect("blocked node present");
    assert!(matches!(
        tombstone.kind,
        ThreadNodeKind::Blocked { ref author } if author == &did(STRANGER)
    ));
    assert!(tombstone.children.is_empty());
}

#[tokio::test]
async fn mention_gate_admits_mentioned_authors_and_the_root_author() {
    let mut store = flat_thread();
    if let RecordValue::Post(root_post) = &mut store
        .records
        .get_mut(&post_uri(ROOT_AUTHOR, "root"))
        .expect("root stored")
        .value
    {
        root_post.facets.push(Facet::Mention { did: did(FRIEND) });
    }
    store.gates.insert(
        post_uri(ROOT_AUTHOR, "root"),
        ThreadGateRecord {
            post: post_uri(ROOT_AUTHOR, "root"),
            allow: vec![ThreadGateRule::Mention],
        },
    );
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("assembled thread");

    // Mentioned friend and the root author pass; the stranger is omitted
    // entirely, not tombstoned.
    assert_eq!(child_rkeys(&tree), ["c1", "c3"]);
}

#[tokio::test]
async fn following_gate_checks_the_viewers_follows() {
    let mut store = flat_thread();
    store.gates.insert(
        post_uri(ROOT_AUTHOR, "root"),
        ThreadGateRecord {
            post: post_uri(ROOT_AUTHOR, "root"),
            allow: vec![ThreadGateRule::Following],
        },
    );
    store.follows.insert(did(VIEWER), vec![did(FRIEND)]);
    let store = Arc::new(store);

    let viewer = did(VIEWER);
    let tree = assembler(store, cache())
        .assemble(
            &anchor(ROOT_AUTHOR, "root"),
            &ThreadParams::default(),
            Some(&viewer),
        )
        .await
        .expect("assembled thread");

    assert_eq!(child_rkeys(&tree), ["c1", "c3"]);
}

#[tokio::test]
async fn list_gate_admits_list_members() {
    let mut store = flat_thread();
    let list = skyview::domain::ids::AtUri::new(format!(
        "at://{ROOT_AUTHOR}/app.bsky.graph.list/allowed"
    ))
    .expect("valid uri");
    store.gates.insert(
        post_uri(ROOT_AUTHOR, "root"),
        ThreadGateRecord {
            post: post_uri(ROOT_AUTHOR, "root"),
            allow: vec![ThreadGateRule::List { list: list.clone() }],
        },
    );
    store.list_items.insert(list, vec![did(STRANGER)]);
    let store = Arc::new(store);

    let tree = assembler(store, cache())
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("assembled thread");

    assert_eq!(child_rkeys(&tree), ["c2", "c3"]);
}

#[tokio::test]
async fn assembly_is_deterministic_without_the_cache() {
    let mut store = flat_thread();
    store.set_likes(&post_uri(FRIEND, "c1"), 3);
    let store = Arc::new(store);
    let disabled = CacheConfig {
        enabled: false,
        ..Default::default()
    };
    let uncached = Arc::new(MemoryCache::new(&disabled, Arc::new(SystemClock)));
    let assembler = assembler(store, uncached);

    let params = ThreadParams {
        sort: SortMode::Top,
        ..Default::default()
    };
    let first = assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &params, None)
        .await
        .expect("first assembly");
    let second = assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &params, None)
        .await
        .expect("second assembly");

    assert_eq!(
        serde_json::to_value(&first).expect("serialized first"),
        serde_json::to_value(&second).expect("serialized second"),
    );
}

#[tokio::test]
async fn assembled_trees_are_memoized_until_a_write_event() {
    let shared_cache = cache();

    // Thread with no replies yet, observed and cached.
    let mut before = StubStore::new();
    before.add_post(post(ROOT_AUTHOR, "root", 0));
    let tree = assembler(Arc::new(before), shared_cache.clone())
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("initial assembly");
    assert!(tree.children.is_empty());

    // The store now has a reply, but the cached tree is still served.
    let root = post_uri(ROOT_AUTHOR, "root");
    let mut after = StubStore::new();
    after.add_post(post(ROOT_AUTHOR, "root", 0));
    after.add_post(reply(FRIEND, "c1", 1, &root, &root));
    let assembler = assembler(Arc::new(after), shared_cache.clone());

    let stale = assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("cached assembly");
    assert!(stale.children.is_empty());

    // The write-path hook invalidates the root's entries; the next read
    // observes the reply.
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(shared_cache.clone(), queue.clone()));
    let trigger = CacheTrigger::new(queue, consumer);
    trigger.on_post_created(&post_uri(FRIEND, "c1"), Some(&root));

    let fresh = assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &ThreadParams::default(), None)
        .await
        .expect("fresh assembly");
    assert_eq!(child_rkeys(&fresh), ["c1"]);
}

#[tokio::test]
async fn following_sets_are_cached_until_a_follow_event() {
    let mut store = flat_thread();
    store.gates.insert(
        post_uri(ROOT_AUTHOR, "root"),
        ThreadGateRecord {
            post: post_uri(ROOT_AUTHOR, "root"),
            allow: vec![ThreadGateRule::Following],
        },
    );
    store.follows.insert(did(VIEWER), vec![did(FRIEND)]);
    let store = Arc::new(store);
    let shared_cache = cache();
    let assembler = assembler(store.clone(), shared_cache.clone());
    let viewer = did(VIEWER);
    // Distinct depths keep the assembled-tree entries from short-circuiting
    // the gate path.
    let params = |depth| ThreadParams {
        depth,
        ..Default::default()
    };

    let first = assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &params(3), Some(&viewer))
        .await
        .expect("first assembly");
    assert_eq!(child_rkeys(&first), ["c1", "c3"]);

    assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &params(4), Some(&viewer))
        .await
        .expect("second assembly");
    assert_eq!(store.calls("following"), 1);

    // A follow event drops the cached set; the next assembly reloads it.
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(shared_cache.clone(), queue.clone()));
    let trigger = CacheTrigger::new(queue, consumer);
    trigger.on_follow_changed(&viewer, &did(STRANGER));

    assembler
        .assemble(&anchor(ROOT_AUTHOR, "root"), &params(5), Some(&viewer))
        .await
        .expect("third assembly");
    assert_eq!(store.calls("following"), 2);
}
