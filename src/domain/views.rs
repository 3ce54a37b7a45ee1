//! Protocol-shaped view objects returned to API consumers.
//!
//! Views are plain data. Every optional field is either present with a valid
//! value or omitted from serialization outright; nothing here serializes as
//! `null`. The structures also deserialize so assembled trees can round-trip
//! through the cache.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ids::{AtUri, Cid, Did};

/// Moderation label applied to a subject (content URI or actor DID).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelView {
    pub src: Did,
    pub subject: String,
    pub val: String,
}

/// Identity of a list that caused a mute or block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRefView {
    pub uri: AtUri,
    pub name: String,
}

/// Relationship between the viewer and a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileViewerState {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_by_list: Option<ListRefView>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked_by: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_by_list: Option<ListRefView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<AtUri>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileViewBasic {
    pub did: Did,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ProfileViewerState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelView>,
}

/// Per-viewer interaction state attached to a post view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostViewerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<AtUri>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thread_muted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reply_disabled: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub embedding_disabled: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageView {
    pub thumb: String,
    pub fullsize: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalView {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

/// A quoted record inside an embed. Missing and viewer-blocked quotes render
/// as tombstones rather than disappearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedRecordView {
    Record {
        uri: AtUri,
        cid: Cid,
        author: ProfileViewBasic,
        value: serde_json::Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        embeds: Vec<EmbedView>,
        #[serde(with = "time::serde::rfc3339")]
        indexed_at: OffsetDateTime,
    },
    NotFound {
        uri: AtUri,
    },
    Blocked {
        uri: AtUri,
        author: Did,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedView {
    Images {
        images: Vec<ImageView>,
    },
    External {
        external: ExternalView,
    },
    Record {
        record: Box<EmbedRecordView>,
    },
    RecordWithMedia {
        record: Box<EmbedRecordView>,
        media: Box<EmbedView>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub uri: AtUri,
    pub cid: Cid,
    pub author: ProfileViewBasic,
    pub record: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
    pub reply_count: u64,
    pub repost_count: u64,
    pub like_count: u64,
    pub quote_count: u64,
    pub bookmark_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub indexed_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<PostViewerState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelView>,
}

/// A node of an assembled reply tree.
///
/// Placeholder kinds carry no body; `Blocked` keeps the author reference so
/// clients can explain the tombstone. Gated replies are not represented at
/// all. Placeholders may still have children: an ancestor chain continues
/// through a deleted or blocked post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub uri: AtUri,
    #[serde(flatten)]
    pub kind: ThreadNodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ThreadNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadNodeKind {
    Post { post: Box<PostView> },
    NotFound,
    Blocked { author: Did },
}

impl ThreadNode {
    pub fn post(uri: AtUri, post: PostView, children: Vec<ThreadNode>) -> Self {
        Self {
            uri,
            kind: ThreadNodeKind::Post {
                post: Box::new(post),
            },
            children,
        }
    }

    pub fn not_found(uri: AtUri) -> Self {
        Self {
            uri,
            kind: ThreadNodeKind::NotFound,
            children: Vec::new(),
        }
    }

    pub fn blocked(uri: AtUri, author: Did) -> Self {
        Self {
            uri,
            kind: ThreadNodeKind::Blocked { author },
            children: Vec::new(),
        }
    }

    pub fn as_post(&self) -> Option<&PostView> {
        match &self.kind {
            ThreadNodeKind::Post { post } => Some(post),
            _ => None,
        }
    }
}
