//! Errors surfaced by the task manager.
//!
//! Classification:
//! - Persistence: the durable store failed; the operation is aborted
//! - Cache: staging cache failure; transient, healed by the next reload
//! - Codec: a staged payload could not be encoded or decoded
//! - Parameters: typed task parameters could not be encoded

use crate::ports::{CacheError, StoreError};
use crate::typed::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Parameters(#[from] CodecError),
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
