//! Shared cache types.

use crate::artifact::DecodedImage;
use crate::executor::ExecutorError;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be parsed
    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The value to store was already released
    #[error("Cache value already released")]
    Released,

    /// The read was abandoned because the request was cancelled
    #[error("Cache operation cancelled")]
    Cancelled,

    /// Disk work could not be scheduled
    #[error("Cache task failed: {0}")]
    Executor(#[from] ExecutorError),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Values whose memory footprint the memory tiers account for.
pub trait MemorySize {
    fn size_in_bytes(&self) -> usize;
}

impl MemorySize for Bytes {
    fn size_in_bytes(&self) -> usize {
        self.len()
    }
}

impl MemorySize for DecodedImage {
    fn size_in_bytes(&self) -> usize {
        DecodedImage::size_in_bytes(self)
    }
}
