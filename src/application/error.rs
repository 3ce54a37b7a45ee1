//! Engine error taxonomy.
//!
//! Callers (an HTTP layer, typically) map these onto protocol responses.
//! Non-critical hydration failures never surface here; they degrade to empty
//! data inside the hydrator.

use thiserror::Error;

use crate::application::pagination::PaginationError;
use crate::application::store::StoreError;
use crate::domain::ids::IdError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("record not found")]
    NotFound,
    #[error("viewer relationship prevents access")]
    Blocked,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map a critical-path store failure. Non-critical batches must not use
    /// this; they degrade locally instead.
    pub fn from_critical_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Unavailable(detail) => Self::UpstreamUnavailable(detail),
            StoreError::Backend(detail) => Self::Internal(detail),
        }
    }
}

impl From<PaginationError> for EngineError {
    fn from(err: PaginationError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<IdError> for EngineError {
    fn from(err: IdError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
