//! Postprocessor capability.
//!
//! A postprocessor turns one decoded image into another. The pipeline treats
//! it as opaque: it only runs it on the light worker pool and, when the
//! postprocessor supplies a cache key, caches the output under a key derived
//! from it.

use crate::artifact::DecodedImage;
use crate::cache::{CacheKey, SimpleCacheKey};
use std::fmt;
use thiserror::Error;

/// Error returned by a failing postprocessor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PostprocessError {
    message: String,
}

impl PostprocessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transform applied to a decoded image before delivery.
pub trait Postprocessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce the transformed image.
    fn process(&self, source: &DecodedImage) -> Result<DecodedImage, PostprocessError>;

    /// Identity of the transform for caching. `None` disables caching of the
    /// postprocessed output.
    fn cache_key(&self) -> Option<CacheKey> {
        None
    }
}

type TransformFn = dyn Fn(&DecodedImage) -> Result<DecodedImage, PostprocessError> + Send + Sync;

/// Postprocessor built from a closure.
pub struct FnPostprocessor {
    name: String,
    cache_key: Option<String>,
    transform: Box<TransformFn>,
}

impl FnPostprocessor {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&DecodedImage) -> Result<DecodedImage, PostprocessError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cache_key: None,
            transform: Box::new(transform),
        }
    }

    /// Cache postprocessed output under the given key.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}

impl Postprocessor for FnPostprocessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, source: &DecodedImage) -> Result<DecodedImage, PostprocessError> {
        (self.transform)(source)
    }

    fn cache_key(&self) -> Option<CacheKey> {
        self.cache_key
            .as_ref()
            .map(|key| CacheKey::Simple(SimpleCacheKey::new(key.clone())))
    }
}

impl fmt::Debug for FnPostprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPostprocessor")
            .field("name", &self.name)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}
