//! Pipeline-level errors.

use crate::cache::CacheError;
use crate::decoder::DecodeError;
use crate::executor::ExecutorError;
use crate::fetch::FetchError;
use crate::resource::ResourceError;
use thiserror::Error;

/// Failure delivered to a consumer through `on_failure`.
///
/// `Clone` because a multiplexed computation hands the same failure to every
/// subscriber.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache failure: {0}")]
    Cache(String),

    #[error("Postprocessor '{name}' failed: {message}")]
    Postprocess { name: String, message: String },

    #[error("Scheduling failed: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse classification of a [`PipelineError`].
///
/// "Not found" is not an error: a tier with no entry completes with an empty
/// final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unrecognised encoded data, or a failed transform
    DecodeFailure,
    /// Network or disk failure
    IoFailure,
    /// Cooperative cancellation was observed
    Cancelled,
    /// Scheduling or resource misuse
    Internal,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::Postprocess { .. } => ErrorKind::DecodeFailure,
            Self::Fetch(_) | Self::Cache(_) => ErrorKind::IoFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Executor(_) | Self::Resource(_) => ErrorKind::Internal,
        }
    }
}

impl From<CacheError> for PipelineError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Cancelled => Self::Cancelled,
            other => Self::Cache(other.to_string()),
        }
    }
}
