//! Error taxonomy for the federated read path.
//!
//! Mirrors the semantic kinds in the design doc: input violations surface
//! as `InvalidArgument`, transient dependency failures as `Internal`,
//! deadline propagation as `DeadlineExceeded`, and point lookups that
//! resolve to nothing as `NotFound`. Corrupt cells and overlay load
//! failures never reach this type — they are handled (dropped/logged) at
//! the layer that detects them.

use thiserror::Error;

/// Top-level error returned by every request handler.
#[derive(Error, Debug)]
pub enum MixerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type MixerResult<T> = Result<T, MixerError>;

impl From<crate::store::rowstore::RowStoreError> for MixerError {
    fn from(e: crate::store::rowstore::RowStoreError) -> Self {
        match e {
            crate::store::rowstore::RowStoreError::Cancelled => MixerError::DeadlineExceeded,
            other => MixerError::Internal(other.to_string()),
        }
    }
}

impl From<crate::codec::CodecError> for MixerError {
    fn from(e: crate::codec::CodecError) -> Self {
        MixerError::Internal(e.to_string())
    }
}

impl From<crate::relational::RelationalError> for MixerError {
    fn from(e: crate::relational::RelationalError) -> Self {
        match e {
            crate::relational::RelationalError::Translate(msg) => {
                MixerError::InvalidArgument(msg)
            }
            crate::relational::RelationalError::Engine(msg) => MixerError::Internal(msg),
        }
    }
}
