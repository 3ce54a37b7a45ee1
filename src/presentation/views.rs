//! View serialization.
//!
//! Everything here is a pure function over a `HydrationState`: no I/O, no
//! awaits. Missing data shrinks the output (omitted fields, tombstone embeds)
//! instead of failing it.

use url::Url;

use crate::application::hydration::HydrationState;
use crate::domain::ids::{AtUri, Did};
use crate::domain::records::{ExternalEmbed, ImageEmbed, RecordEmbed};
use crate::domain::views::{
    EmbedRecordView, EmbedView, ExternalView, ImageView, LabelView, ListRefView, PostView,
    PostViewerState, ProfileViewBasic, ProfileViewerState,
};

use super::blobs::{self, ImageFormat};

// Quoted records render their own embeds this many levels down; below the
// cap a quote still appears, just without its nested embeds.
const QUOTE_EMBED_DEPTH: usize = 2;

/// Serialize one hydrated post into its view. Returns `None` when the record
/// is absent from the state or is not a post.
pub fn serialize_post(uri: &AtUri, state: &HydrationState, base: &Url) -> Option<PostView> {
    let (row, post) = state.post_record(uri)?;
    let author = uri.authority();
    let record = serde_json::to_value(&row.value).ok()?;
    let aggregates = state.aggregates_or_zero(uri);

    Some(PostView {
        uri: uri.clone(),
        cid: row.cid.clone(),
        author: serialize_profile(&author, state, base),
        record,
        embed: post
            .embed
            .as_ref()
            .and_then(|embed| serialize_embed(embed, &author, state, base, QUOTE_EMBED_DEPTH)),
        reply_count: aggregates.reply_count,
        repost_count: aggregates.repost_count,
        like_count: aggregates.like_count,
        quote_count: aggregates.quote_count,
        bookmark_count: aggregates.bookmark_count,
        indexed_at: row.indexed_at,
        viewer: post_viewer_state(uri, state),
        labels: label_views(uri.as_str(), state),
    })
}

/// Serialize an author profile from whatever identity data hydration found.
/// Missing actor rows fall back to the sentinel handle.
pub fn serialize_profile(did: &Did, state: &HydrationState, base: &Url) -> ProfileViewBasic {
    let actor = state.actor(did);
    let profile = actor.and_then(|row| row.profile.as_ref());

    ProfileViewBasic {
        did: did.clone(),
        handle: blobs::presented_handle(actor.and_then(|row| row.handle.as_deref())),
        display_name: blobs::presented_display_name(
            profile.and_then(|record| record.display_name.as_deref()),
        ),
        avatar: profile
            .and_then(|record| record.avatar.as_ref())
            .and_then(|blob| blobs::blob_url(base, ImageFormat::Avatar, did, blob)),
        viewer: profile_viewer_state(did, state),
        labels: label_views(did.as_str(), state),
    }
}

fn profile_viewer_state(did: &Did, state: &HydrationState) -> Option<ProfileViewerState> {
    state.viewer.as_ref()?;
    let relationship = state.relationship(did);
    let list_mute = state.list_mute(did);
    let list_block = state.list_block(did);

    let view = ProfileViewerState {
        muted: relationship.is_some_and(|r| r.muting.is_some()) || list_mute.is_some(),
        muted_by_list: list_mute.map(list_ref_view),
        blocked_by: relationship.is_some_and(|r| r.blocked_by.is_some()),
        blocking: relationship.and_then(|r| r.blocking.clone()),
        blocking_by_list: list_block.map(list_ref_view),
        following: relationship.and_then(|r| r.following.clone()),
        followed_by: relationship.and_then(|r| r.followed_by.clone()),
    };
    Some(view)
}

fn post_viewer_state(uri: &AtUri, state: &HydrationState) -> Option<PostViewerState> {
    state.viewer.as_ref()?;
    let row = state.viewer_state(uri)?;
    Some(PostViewerState {
        like: row.like.clone(),
        repost: row.repost.clone(),
        bookmark: row.bookmark.clone(),
        thread_muted: row.thread_muted,
        reply_disabled: row.reply_disabled,
        embedding_disabled: row.embedding_disabled,
        pinned: row.pinned,
    })
}

fn label_views(subject: &str, state: &HydrationState) -> Vec<LabelView> {
    state
        .labels_for(subject)
        .iter()
        .map(|label| LabelView {
            src: label.src.clone(),
            subject: label.subject.clone(),
            val: label.val.clone(),
        })
        .collect()
}

fn list_ref_view(membership: &crate::application::store::ListMembership) -> ListRefView {
    ListRefView {
        uri: membership.list.clone(),
        name: membership.list_name.clone(),
    }
}

fn serialize_embed(
    embed: &RecordEmbed,
    author: &Did,
    state: &HydrationState,
    base: &Url,
    depth: usize,
) -> Option<EmbedView> {
    match embed {
        RecordEmbed::Images { images } => {
            let views: Vec<ImageView> = images
                .iter()
                .filter_map(|image| image_view(image, author, base))
                .collect();
            (!views.is_empty()).then_some(EmbedView::Images { images: views })
        }
        RecordEmbed::External { external } => Some(EmbedView::External {
            external: external_view(external, author, base),
        }),
        RecordEmbed::Record { record } => Some(EmbedView::Record {
            record: Box::new(quoted_record_view(&record.uri, state, base, depth)),
        }),
        RecordEmbed::RecordWithMedia { record, media } => {
            let record_view = Box::new(quoted_record_view(&record.uri, state, base, depth));
            match serialize_embed(media, author, state, base, depth) {
                Some(media_view) => Some(EmbedView::RecordWithMedia {
                    record: record_view,
                    media: Box::new(media_view),
                }),
                // Media with no renderable content degrades to a plain quote.
                None => Some(EmbedView::Record {
                    record: record_view,
                }),
            }
        }
    }
}

fn image_view(image: &ImageEmbed, author: &Did, base: &Url) -> Option<ImageView> {
    let thumb = blobs::blob_url(base, ImageFormat::FeedThumbnail, author, &image.image)?;
    let fullsize = blobs::blob_url(base, ImageFormat::FeedFullsize, author, &image.image)?;
    Some(ImageView {
        thumb,
        fullsize,
        alt: image.alt.clone(),
    })
}

fn external_view(external: &ExternalEmbed, author: &Did, base: &Url) -> ExternalView {
    ExternalView {
        uri: blobs::absolutize(base, &external.uri),
        title: external.title.clone(),
        description: external.description.clone(),
        thumb: external
            .thumb
            .as_ref()
            .and_then(|blob| blobs::blob_url(base, ImageFormat::FeedThumbnail, author, blob)),
    }
}

fn quoted_record_view(
    uri: &AtUri,
    state: &HydrationState,
    base: &Url,
    depth: usize,
) -> EmbedRecordView {
    let author = uri.authority();
    if state.blocked_between_viewer_and(&author) {
        return EmbedRecordView::Blocked {
            uri: uri.clone(),
            author,
        };
    }
    let Some(row) = state.record(uri) else {
        return EmbedRecordView::NotFound { uri: uri.clone() };
    };
    let Ok(value) = serde_json::to_value(&row.value) else {
        return EmbedRecordView::NotFound { uri: uri.clone() };
    };

    let embeds = if depth > 0 {
        row.value
            .as_post()
            .and_then(|post| post.embed.as_ref())
            .and_then(|embed| serialize_embed(embed, &author, state, base, depth - 1))
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };

    EmbedRecordView::Record {
        uri: uri.clone(),
        cid: row.cid.clone(),
        author: serialize_profile(&author, state, base),
        value,
        embeds,
        indexed_at: row.indexed_at,
    }
}
