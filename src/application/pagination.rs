//! Opaque cursor pagination.
//!
//! Cursors encode the ordering fields of the last returned row. Unparseable
//! cursors are rejected outright; a garbage cursor never silently restarts a
//! listing from the top.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::ids::AtUri;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimeCursorPayload {
    sort_key: OffsetDateTime,
    uri: AtUri,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RankCursorPayload {
    score: i64,
    sort_key: OffsetDateTime,
    uri: AtUri,
}

/// Cursor over a chronologically ordered result set, with the row URI as a
/// stable tiebreaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeCursor {
    sort_key: OffsetDateTime,
    uri: AtUri,
}

impl TimeCursor {
    pub fn new(sort_key: OffsetDateTime, uri: AtUri) -> Self {
        Self { sort_key, uri }
    }

    pub fn sort_key(&self) -> OffsetDateTime {
        self.sort_key
    }

    pub fn uri(&self) -> &AtUri {
        &self.uri
    }

    pub fn encode(&self) -> String {
        let payload = TimeCursorPayload {
            sort_key: self.sort_key,
            uri: self.uri.clone(),
        };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing time cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: TimeCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            sort_key: payload.sort_key,
            uri: payload.uri,
        })
    }
}

/// Cursor over a popularity-ordered result set: a numeric score first, then
/// time, then URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankCursor {
    score: i64,
    sort_key: OffsetDateTime,
    uri: AtUri,
}

impl RankCursor {
    pub fn new(score: i64, sort_key: OffsetDateTime, uri: AtUri) -> Self {
        Self {
            score,
            sort_key,
            uri,
        }
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn sort_key(&self) -> OffsetDateTime {
        self.sort_key
    }

    pub fn uri(&self) -> &AtUri {
        &self.uri
    }

    pub fn encode(&self) -> String {
        let payload = RankCursorPayload {
            score: self.score,
            sort_key: self.sort_key,
            uri: self.uri.clone(),
        };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing rank cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: RankCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            score: payload.score,
            sort_key: payload.sort_key,
            uri: payload.uri,
        })
    }
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone)]
pub struct PageRequest<C> {
    pub limit: usize,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: usize, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }

    /// Rows to fetch from storage: one extra row decides `next_cursor`.
    pub fn fetch_limit(&self) -> usize {
        self.limit + 1
    }
}

/// Cursor-aware page result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Apply the limit+1 discipline to rows fetched with `fetch_limit()`.
///
/// The extra row is discarded and the next cursor derives from the last row
/// actually returned, never from the discarded one.
pub fn paginate<T>(
    mut rows: Vec<T>,
    limit: usize,
    to_cursor: impl Fn(&T) -> String,
) -> CursorPage<T> {
    let has_more = rows.len() > limit;
    if has_more {
        rows.truncate(limit);
    }
    let next_cursor = if has_more {
        rows.last().map(&to_cursor)
    } else {
        None
    };
    CursorPage {
        items: rows,
        next_cursor,
    }
}
