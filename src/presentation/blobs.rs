//! Blob reference resolution and identity display policies.
//!
//! These are the small, heavily-exercised rules the serializer leans on:
//! turning a blob ref into a CDN URL (or nothing, never a broken link) and
//! picking what to show for an account's name.

use url::Url;

use crate::domain::ids::{Cid, Did};
use crate::domain::records::BlobRef;

/// Fallback handle shown when no valid handle is known.
pub const INVALID_HANDLE: &str = "handle.invalid";

/// Image rendition requested from the CDN path convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Avatar,
    Banner,
    FeedThumbnail,
    FeedFullsize,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Avatar => "avatar",
            ImageFormat::Banner => "banner",
            ImageFormat::FeedThumbnail => "feed_thumbnail",
            ImageFormat::FeedFullsize => "feed_fullsize",
        }
    }
}

/// Resolve a blob reference to a CDN URL.
///
/// Returns `None` for empty, placeholder (`"undefined"`/`"null"`), or
/// otherwise invalid identifiers; callers omit the field instead of emitting
/// a broken reference.
pub fn blob_url(base: &Url, format: ImageFormat, author: &Did, blob: &BlobRef) -> Option<String> {
    let cid = normalize_blob_cid(blob)?;
    let base = base.as_str().trim_end_matches('/');
    Some(format!(
        "{base}/img/{}/plain/{author}/{cid}@jpeg",
        format.as_str()
    ))
}

/// Normalize a blob reference to a canonical CID string.
///
/// Canonical strings pass through validation; raw multihash bytes (the legacy
/// form) are wrapped as CIDv1 with the raw codec and rendered in base32lower
/// multibase.
pub fn normalize_blob_cid(blob: &BlobRef) -> Option<String> {
    match blob {
        BlobRef::Cid(value) => Cid::new(value.clone()).ok().map(|cid| cid.to_string()),
        BlobRef::Multihash(bytes) => {
            if bytes.is_empty() {
                return None;
            }
            // CIDv1, raw codec, then the multihash itself.
            let mut cid_bytes = Vec::with_capacity(bytes.len() + 2);
            cid_bytes.push(0x01);
            cid_bytes.push(0x55);
            cid_bytes.extend_from_slice(bytes);
            Some(format!("b{}", base32_lower(&cid_bytes)))
        }
    }
}

// RFC 4648 base32, lowercase, no padding. The multibase spec calls this
// alphabet `base32`; no crate in the dependency tree provides it.
fn base32_lower(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// The handle to present for an account.
///
/// A handle that is itself a DID string is treated as invalid: it would leak
/// an internal identifier where a name belongs.
pub fn presented_handle(handle: Option<&str>) -> String {
    match handle {
        Some(h) if !h.is_empty() && !Did::is_did_string(h) => h.to_string(),
        _ => INVALID_HANDLE.to_string(),
    }
}

/// Display name if it is a non-empty string, otherwise nothing.
pub fn presented_display_name(display_name: Option<&str>) -> Option<String> {
    display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// The full precedence chain: display name, then handle, then the sentinel.
pub fn display_label(display_name: Option<&str>, handle: Option<&str>) -> String {
    presented_display_name(display_name).unwrap_or_else(|| presented_handle(handle))
}

/// Rewrite a possibly relative media URL to absolute against `base`.
pub fn absolutize(base: &Url, candidate: &str) -> String {
    match Url::parse(candidate) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => base
            .join(candidate)
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| candidate.to_string()),
    }
}
