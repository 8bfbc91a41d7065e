//! The immutable description of what a caller wants.

use super::level::{CacheChoice, Priority, RequestLevel};
use super::options::{DecodeOptions, ResizeOptions, RotationOptions};
use super::source::ImageSource;
use crate::postprocess::Postprocessor;
use std::fmt;
use std::sync::Arc;

/// An image request: source plus decode, resize and cache options.
#[derive(Clone)]
pub struct ImageRequest {
    source: ImageSource,
    alternate_sources: Vec<ImageSource>,
    cache_choice: CacheChoice,
    lowest_permitted_level: RequestLevel,
    priority: Priority,
    resize: Option<ResizeOptions>,
    rotation: RotationOptions,
    decode_options: DecodeOptions,
    postprocessor: Option<Arc<dyn Postprocessor>>,
    progressive_rendering: bool,
    disk_cache_enabled: bool,
}

impl ImageRequest {
    /// Request for `uri` with default options.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            source: ImageSource::parse(uri),
            alternate_sources: Vec::new(),
            cache_choice: CacheChoice::Default,
            lowest_permitted_level: RequestLevel::FullFetch,
            priority: Priority::Normal,
            resize: None,
            rotation: RotationOptions::default(),
            decode_options: DecodeOptions::default(),
            postprocessor: None,
            progressive_rendering: false,
            disk_cache_enabled: true,
        }
    }

    /// Additional URIs the same content may be cached under.
    pub fn with_alternate_uri(mut self, uri: impl Into<String>) -> Self {
        self.alternate_sources.push(ImageSource::parse(uri));
        self
    }

    pub fn with_cache_choice(mut self, choice: CacheChoice) -> Self {
        self.cache_choice = choice;
        self
    }

    pub fn with_lowest_permitted_level(mut self, level: RequestLevel) -> Self {
        self.lowest_permitted_level = level;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_resize(mut self, resize: ResizeOptions) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn with_rotation(mut self, rotation: RotationOptions) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn with_postprocessor(mut self, postprocessor: Arc<dyn Postprocessor>) -> Self {
        self.postprocessor = Some(postprocessor);
        self
    }

    pub fn with_progressive_rendering(mut self, enabled: bool) -> Self {
        self.progressive_rendering = enabled;
        self
    }

    pub fn with_disk_cache_enabled(mut self, enabled: bool) -> Self {
        self.disk_cache_enabled = enabled;
        self
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn uri(&self) -> &str {
        self.source.uri()
    }

    pub fn alternate_sources(&self) -> &[ImageSource] {
        &self.alternate_sources
    }

    pub fn cache_choice(&self) -> CacheChoice {
        self.cache_choice
    }

    pub fn lowest_permitted_level(&self) -> RequestLevel {
        self.lowest_permitted_level
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn resize(&self) -> Option<ResizeOptions> {
        self.resize
    }

    pub fn rotation(&self) -> RotationOptions {
        self.rotation
    }

    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode_options
    }

    pub fn postprocessor(&self) -> Option<&Arc<dyn Postprocessor>> {
        self.postprocessor.as_ref()
    }

    pub fn is_progressive_rendering_enabled(&self) -> bool {
        self.progressive_rendering
    }

    pub fn is_disk_cache_enabled(&self) -> bool {
        self.disk_cache_enabled
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRequest")
            .field("uri", &self.source.uri())
            .field("cache_choice", &self.cache_choice)
            .field("lowest_permitted_level", &self.lowest_permitted_level)
            .field("resize", &self.resize)
            .field("postprocessor", &self.postprocessor.as_ref().map(|p| p.name()))
            .finish()
    }
}
