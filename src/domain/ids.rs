//! Validated protocol identifiers.
//!
//! Identifiers are parsed once at construction; the rest of the crate works
//! with already-valid values and never re-checks them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid DID `{0}`")]
    InvalidDid(String),
    #[error("invalid AT-URI `{0}`")]
    InvalidUri(String),
    #[error("invalid CID `{0}`")]
    InvalidCid(String),
}

/// Decentralized identifier naming an account (`did:<method>:<identifier>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        let rest = value
            .strip_prefix("did:")
            .ok_or_else(|| IdError::InvalidDid(value.clone()))?;
        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| IdError::InvalidDid(value.clone()))?;
        let method_ok = !method.is_empty() && method.chars().all(|c| c.is_ascii_lowercase());
        let identifier_ok = !identifier.is_empty()
            && identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'));
        if !method_ok || !identifier_ok {
            return Err(IdError::InvalidDid(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `value` looks like a DID. Used by the handle fallback policy,
    /// which must not present a DID where a handle belongs.
    pub fn is_did_string(value: &str) -> bool {
        Self::new(value).is_ok()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Did {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

/// Stable identifier of a record (`at://<did>/<collection>/<rkey>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AtUri {
    raw: String,
    authority_len: usize,
    collection_len: usize,
}

impl AtUri {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let raw = value.into();
        let rest = raw
            .strip_prefix("at://")
            .ok_or_else(|| IdError::InvalidUri(raw.clone()))?;
        let mut parts = rest.splitn(3, '/');
        let authority = parts.next().unwrap_or_default();
        let collection = parts
            .next()
            .ok_or_else(|| IdError::InvalidUri(raw.clone()))?;
        let rkey = parts
            .next()
            .ok_or_else(|| IdError::InvalidUri(raw.clone()))?;

        Did::new(authority).map_err(|_| IdError::InvalidUri(raw.clone()))?;
        let collection_ok = collection.contains('.')
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        let rkey_ok = !rkey.is_empty() && !rkey.contains('/');
        if !collection_ok || !rkey_ok {
            return Err(IdError::InvalidUri(raw));
        }
        Ok(Self {
            authority_len: authority.len(),
            collection_len: collection.len(),
            raw,
        })
    }

    /// Build a URI from already-validated components.
    pub fn make(did: &Did, collection: &str, rkey: &str) -> Result<Self, IdError> {
        Self::new(format!("at://{did}/{collection}/{rkey}"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The DID owning the record. Valid by construction.
    pub fn authority(&self) -> Did {
        Did(self.raw[5..5 + self.authority_len].to_string())
    }

    pub fn collection(&self) -> &str {
        let start = 5 + self.authority_len + 1;
        &self.raw[start..start + self.collection_len]
    }

    pub fn rkey(&self) -> &str {
        &self.raw[5 + self.authority_len + 1 + self.collection_len + 1..]
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for AtUri {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AtUri> for String {
    fn from(uri: AtUri) -> Self {
        uri.raw
    }
}

/// Content identifier (hash) of a record or blob version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        // Serialized upstream data occasionally carries the literal strings
        // "undefined" and "null" where a CID belongs; both are invalid.
        let plausible = value.len() >= 8
            && value != "undefined"
            && value != "null"
            && value.chars().all(|c| c.is_ascii_alphanumeric());
        if !plausible {
            return Err(IdError::InvalidCid(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

/// Opaque stable reference to a content record, with an optional content hash
/// for optimistic validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub uri: AtUri,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<Cid>,
}

impl ContentRef {
    pub fn new(uri: AtUri) -> Self {
        Self { uri, cid: None }
    }

    pub fn with_cid(uri: AtUri, cid: Cid) -> Self {
        Self {
            uri,
            cid: Some(cid),
        }
    }
}
