//! Stored record variants.
//!
//! Records arrive from storage as JSON and are validated into these tagged
//! unions once, at the hydration boundary. Serialization and thread assembly
//! match on the discriminant instead of probing loose maps.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ids::{AtUri, Cid, ContentRef, Did};

/// Pointer to binary media. Either a canonical CID string or the raw
/// multihash bytes some legacy records still carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobRef {
    Cid(String),
    Multihash(Vec<u8>),
}

/// Rich-text annotation inside a post body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Facet {
    Mention { did: Did },
    Link { uri: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEmbed {
    pub image: BlobRef,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

/// Embedded content attached to a post. `Record` and `RecordWithMedia`
/// reference other records by URI; their bodies come from hydration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordEmbed {
    Images { images: Vec<ImageEmbed> },
    External { external: ExternalEmbed },
    Record { record: ContentRef },
    RecordWithMedia {
        record: ContentRef,
        media: Box<RecordEmbed>,
    },
}

/// Parent and root pointers of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: ContentRef,
    pub parent: ContentRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<RecordEmbed>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PostRecord {
    /// DIDs mentioned in the post body, in facet order.
    pub fn mentioned_dids(&self) -> Vec<&Did> {
        self.facets
            .iter()
            .filter_map(|facet| match facet {
                Facet::Mention { did } => Some(did),
                Facet::Link { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub subject: ContentRef,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostRecord {
    pub subject: ContentRef,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub subject: Did,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub subject: Did,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPurpose {
    ModList,
    CurateList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecord {
    pub name: String,
    pub purpose: ListPurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItemRecord {
    pub list: AtUri,
    pub subject: Did,
}

/// Allow-rule attached to a thread root. A reply not authored by the root
/// author must match at least one rule to appear in the assembled thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ThreadGateRule {
    Mention,
    Following,
    List { list: AtUri },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadGateRecord {
    pub post: AtUri,
    #[serde(default)]
    pub allow: Vec<ThreadGateRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<BlobRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stored record, discriminated by collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum RecordValue {
    #[serde(rename = "app.bsky.feed.post")]
    Post(PostRecord),
    #[serde(rename = "app.bsky.feed.like")]
    Like(LikeRecord),
    #[serde(rename = "app.bsky.feed.repost")]
    Repost(RepostRecord),
    #[serde(rename = "app.bsky.graph.follow")]
    Follow(FollowRecord),
    #[serde(rename = "app.bsky.graph.block")]
    Block(BlockRecord),
    #[serde(rename = "app.bsky.graph.list")]
    List(ListRecord),
    #[serde(rename = "app.bsky.graph.listitem")]
    ListItem(ListItemRecord),
    #[serde(rename = "app.bsky.feed.threadgate")]
    ThreadGate(ThreadGateRecord),
    #[serde(rename = "app.bsky.actor.profile")]
    Profile(ProfileRecord),
}

impl RecordValue {
    pub fn as_post(&self) -> Option<&PostRecord> {
        match self {
            RecordValue::Post(post) => Some(post),
            _ => None,
        }
    }
}

/// A record row as returned by storage: identity plus validated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub uri: AtUri,
    pub cid: Cid,
    pub value: RecordValue,
    #[serde(with = "time::serde::rfc3339")]
    pub indexed_at: OffsetDateTime,
}

/// Actor identity and profile as returned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRow {
    pub did: Did,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRecord>,
}
