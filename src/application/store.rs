//! Storage collaborator traits.
//!
//! The engine never talks to a database directly; it consumes batched,
//! read-only lookups behind `RecordStore`. Every method takes a full key set
//! and answers in one round trip, which is what keeps hydration at a constant
//! number of queries per request.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{AtUri, ContentRef, Did};
use crate::domain::records::{ActorRow, RecordRow, ThreadGateRecord};

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn from_backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Aggregation counts for a content URI. Missing rows mean all zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
    pub bookmark_count: u64,
}

/// Per-(uri, viewer) interaction state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerStateRow {
    pub like: Option<AtUri>,
    pub repost: Option<AtUri>,
    pub bookmark: Option<AtUri>,
    pub thread_muted: bool,
    pub reply_disabled: bool,
    pub embedding_disabled: bool,
    pub pinned: bool,
}

/// Pairwise relationship between the viewer and one author. Each field is the
/// URI of the record establishing the relationship, or absent. Serializable
/// because rows are cached per (viewer, author) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub following: Option<AtUri>,
    pub followed_by: Option<AtUri>,
    pub blocking: Option<AtUri>,
    pub blocked_by: Option<AtUri>,
    pub muting: Option<AtUri>,
}

impl Relationship {
    /// A block in either direction hides content between the two parties.
    pub fn blocked_either_way(&self) -> bool {
        self.blocking.is_some() || self.blocked_by.is_some()
    }

    pub fn is_following(&self) -> bool {
        self.following.is_some()
    }
}

/// A moderation label row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    pub src: Did,
    pub subject: String,
    pub val: String,
}

/// Membership of an author in one of the viewer's mute/block lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMembership {
    pub list: AtUri,
    pub list_name: String,
}

/// Batched read-only storage interface consumed by the engine.
///
/// `get_replies` must return each parent's replies in stored order
/// (`created_at`, then URI); the assembler relies on that order being stable
/// for deterministic tie-breaking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_records(
        &self,
        refs: &[ContentRef],
    ) -> Result<HashMap<AtUri, RecordRow>, StoreError>;

    async fn get_actors(&self, dids: &[Did]) -> Result<HashMap<Did, ActorRow>, StoreError>;

    async fn get_aggregates(
        &self,
        uris: &[AtUri],
    ) -> Result<HashMap<AtUri, Aggregates>, StoreError>;

    async fn get_viewer_states(
        &self,
        uris: &[AtUri],
        viewer: &Did,
    ) -> Result<HashMap<AtUri, ViewerStateRow>, StoreError>;

    async fn get_relationships(
        &self,
        viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, Relationship>, StoreError>;

    /// Labels for a mixed subject set (content URIs and author DIDs).
    async fn get_labels_for_subjects(
        &self,
        subjects: &[String],
    ) -> Result<HashMap<String, Vec<LabelRow>>, StoreError>;

    async fn get_list_mutes(
        &self,
        viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, ListMembership>, StoreError>;

    async fn get_list_blocks(
        &self,
        viewer: &Did,
        dids: &[Did],
    ) -> Result<HashMap<Did, ListMembership>, StoreError>;

    async fn get_thread_gate(&self, uri: &AtUri)
    -> Result<Option<ThreadGateRecord>, StoreError>;

    async fn get_list_items(&self, list: &AtUri) -> Result<Vec<Did>, StoreError>;

    /// Every account the given account follows.
    async fn get_following(&self, actor: &Did) -> Result<Vec<Did>, StoreError>;

    /// Replies for every parent in one batch, at most `limit` per parent.
    async fn get_replies(
        &self,
        parents: &[AtUri],
        limit: usize,
    ) -> Result<HashMap<AtUri, Vec<ContentRef>>, StoreError>;
}
