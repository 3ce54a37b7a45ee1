//! Shared fixtures: an in-memory `RecordStore` with call counting, and
//! builders for the record rows the tests assemble threads from.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;

use skyview::application::store::{
    Aggregates, LabelRow, ListMembership, RecordStore, Relationship, StoreError, ViewerStateRow,
};
use skyview::domain::ids::{AtUri, Cid, ContentRef, Did};
use skyview::domain::records::{
    ActorRow, PostRecord, RecordEmbed, RecordRow, RecordValue, ReplyRef, ThreadGateRecord,
};

static TRACING: Once = Once::new();

/// Route engine logs through the test harness when `RUST_LOG` asks for them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn base_time() -> OffsetDateTime {
    datetime!(2024-05-01 12:00 UTC)
}

pub fn did(s: &str) -> Did {
    Did::new(s).expect("valid did")
}

pub fn post_uri(author: &str, rkey: &str) -> AtUri {
    AtUri::new(format!("at://{author}/app.bsky.feed.post/{rkey}")).expect("valid uri")
}

pub fn post(author: &str, rkey: &str, minute: i64) -> RecordRow {
    post_with(author, rkey, minute, None, None)
}

pub fn reply(author: &str, rkey: &str, minute: i64, root: &AtUri, parent: &AtUri) -> RecordRow {
    post_with(
        author,
        rkey,
        minute,
        Some(ReplyRef {
            root: ContentRef::new(root.clone()),
            parent: ContentRef::new(parent.clone()),
        }),
        None,
    )
}

pub fn post_with(
    author: &str,
    rkey: &str,
    minute: i64,
    reply: Option<ReplyRef>,
    embed: Option<RecordEmbed>,
) -> RecordRow {
    let created_at = base_time() + time::Duration::minutes(minute);
    RecordRow {
        uri: post_uri(author, rkey),
        cid: Cid::new("bafkreistub1").expect("valid cid"),
        value: RecordValue::Post(PostRecord {
            text: format!("post {rkey}"),
            facets: Vec::new(),
            reply,
            embed,
            created_at,
        }),
        indexed_at: created_at,
    }
}

pub fn follow_relationship(viewer: &str) -> Relationship {
    let uri =
        AtUri::new(format!("at://{viewer}/app.bsky.graph.follow/3f1")).expect("valid uri");
    Relationship {
        following: Some(uri),
        ..Default::default()
    }
}

pub fn block_relationship(viewer: &str) -> Relationship {
    let uri =
        AtUri::new(format!("at://{viewer}/app.bsky.graph.block/3b1")).expect("valid uri");
    Relationship {
        blocking: Some(uri),
        ..Default::default()
    }
}

/// In-memory store. Every trait method increments its own call counter so
/// tests can assert on batch counts.
#[derive(Default)]
pub struct StubStore {
    pub records: HashMap<AtUri, RecordRow>,
    pub actors: HashMap<Did, ActorRow>,
    pub aggregates: HashMap<AtUri, Aggregates>,
    pub viewer_states: HashMap<AtUri, ViewerStateRow>,
    pub relationships: HashMap<Did, Relationship>,
    pub labels: HashMap<String, Vec<LabelRow>>,
    pub list_mutes: HashMap<Did, ListMembership>,
    pub list_blocks: HashMap<Did, ListMembership>,
    pub gates: HashMap<AtUri, ThreadGateRecord>,
    pub list_items: HashMap<AtUri, Vec<Did>>,
    pub follows: HashMap<Did, Vec<Did>>,
    replies: HashMap<AtUri, Vec<ContentRef>>,
    failing: HashSet<&'static str>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a post row and, when it is a reply, index it under its parent.
    pub fn add_post(&mut self, row: RecordRow) {
        if let RecordValue::Post(post) = &row.value
            && let Some(reply) = post.reply.as_ref()
        {
            self.replies
                .entry(reply.parent.uri.clone())
                .or_default()
                .push(ContentRef::new(row.uri.clone()));
        }
        self.records.insert(row.uri.clone(), row);
    }

    pub fn set_likes(&mut self, uri: &AtUri, like_count: u64) {
        self.aggregates.insert(
            uri.clone(),
            Aggregates {
                like_count,
                ..Default::default()
            },
        );
    }

    /// Make the named batch fail with `StoreError::Unavailable`.
    pub fn fail(&mut self, batch: &'static str) {
        self.failing.insert(batch);
    }

    pub fn calls(&self, batch: &'static str) -> usize {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .get(batch)
            .unwrap_or(&0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    fn track(&self, batch: &'static str) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(batch)
            .or_insert(0) += 1;
        if self.failing.contains(batch) {
            return Err(StoreError::Unavailable(format!("{batch} is down")));
        }
        Ok(())
    }

    fn created_at(&self, uri: &AtUri) -> OffsetDateTime {
        self.records
            .get(uri)
            .and_then(|row| row.value.as_post())
            .map(|post| post.created_at)
            .unwrap_or_else(base_time)
    }
}

#[async_trait]
impl RecordStore for StubStore {
    async fn get_records(
        &self,
        refs: &[ContentRef],
    ) -> Result<HashMap<AtUri, RecordRow>, StoreError> {
        self.track("records")?;
        Ok(refs
            .iter()
            .filter_map(|r| self.records.get(&r.uri).cloned())
            .map(|row| (row.uri.clone(), row))
            .collect())
    }

    async fn get_actors(&self, dids: &[Did]) -> Result<HashMap<Did, ActorRow>, StoreError> {
        self.track("actors")?;
        Ok(dids
            .iter()
            .filter_map(|did| self.actors.get(did).cloned())
            .map(|row| (row.did.clone(), row))
            .collect())
    }

    async fn get_aggregates(
        &self,
        uris: &[AtUri],
    ) -> Result<HashMap<AtUri, Aggregates>, StoreError> {
        self.track("aggregates")?;
        Ok(uris
            .iter()
            .filter_map(|uri| self.aggregates.get(uri).map(|agg| (uri.clone(), *agg)))
            .collect())
    }

    async fn get_viewer_states(
        &self,
        uris: &[AtUri],
        _viewer: &Did,
    ) -> Result<HashMap<AtUri, ViewerStateRow>, StoreError> {
        self.track("viewer_states")?;
        Ok(uris
            .iter()
            .filter_map(|uri| {
                self.viewer_states
                    .get(uri)
                    .map(|row| (uri.clone(), row.clone()))
            })
            .collect())
    }

    async fn get_relationships(
        &self,
        _viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, Relationship>, StoreError> {
        self.track("relationships")?;
        Ok(dids
            .iter()
            .filter_map(|did| {
                self.relationships
                    .get(did)
                    .map(|rel| (did.clone(), rel.clone()))
            })
            .collect())
    }

    async fn get_labels_for_subjects(
        &self,
        subjects: &[String],
    ) -> Result<HashMap<String, Vec<LabelRow>>, StoreError> {
        self.track("labels")?;
        Ok(subjects
            .iter()
            .filter_map(|subject| {
                self.labels
                    .get(subject)
                    .map(|rows| (subject.clone(), rows.clone()))
            })
            .collect())
    }

    async fn get_list_mutes(
        &self,
        _viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, ListMembership>, StoreError> {
        self.track("list_mutes")?;
        Ok(dids
            .iter()
            .filter_map(|did| {
                self.list_mutes
                    .get(did)
                    .map(|membership| (did.clone(), membership.clone()))
            })
            .collect())
    }

    async fn get_list_blocks(
        &self,
        _viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, ListMembership>, StoreError> {
        self.track("list_blocks")?;
        Ok(dids
            .iter()
            .filter_map(|did| {
                self.list_blocks
                    .get(did)
                    .map(|membership| (did.clone(), membership.clone()))
            })
            .collect())
    }

    async fn get_thread_gate(
        &self,
        uri: &AtUri,
    ) -> Result<Option<ThreadGateRecord>, StoreError> {
        self.track("thread_gate")?;
        Ok(self.gates.get(uri).cloned())
    }

    async fn get_list_items(&self, list: &AtUri) -> Result<Vec<Did>, StoreError> {
        self.track("list_items")?;
        Ok(self.list_items.get(list).cloned().unwrap_or_default())
    }

    async fn get_following(&self, actor: &Did) -> Result<Vec<Did>, StoreError> {
        self.track("following")?;
        Ok(self.follows.get(actor).cloned().unwrap_or_default())
    }

    async fn get_replies(
        &self,
        parents: &[AtUri],
        limit: usize,
    ) -> Result<HashMap<AtUri, Vec<ContentRef>>, StoreError> {
        self.track("replies")?;
        Ok(parents
            .iter()
            .filter_map(|parent| {
                let mut refs = self.replies.get(parent)?.clone();
                refs.sort_by(|a, b| {
                    self.created_at(&a.uri)
                        .cmp(&self.created_at(&b.uri))
                        .then_with(|| a.uri.as_str().cmp(b.uri.as_str()))
                });
                refs.truncate(limit);
                Some((parent.clone(), refs))
            })
            .collect())
    }
}
