//! Pipeline construction errors.

use crate::cache::CacheError;
use crate::executor::ExecutorError;
use crate::fetch::FetchError;
use thiserror::Error;

/// Failure to assemble an [`ImagePipeline`](super::ImagePipeline).
#[derive(Debug, Error)]
pub enum BuildError {
    /// Worker pools could not be created (usually: no Tokio runtime)
    #[error("executor setup failed: {0}")]
    Executor(#[from] ExecutorError),

    /// A cache tier could not be opened
    #[error("cache setup failed: {0}")]
    Cache(#[from] CacheError),

    /// The default fetchers could not be created
    #[error("fetcher setup failed: {0}")]
    Fetch(#[from] FetchError),
}
