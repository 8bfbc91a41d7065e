//! The pipeline entry point.

use super::data_source::{ChannelConsumer, DataSource};
use super::error::BuildError;
use super::sequence::{ProducerSequences, SequenceParts};
use crate::artifact::{EncodedImage, ImageRef};
use crate::cache::{CacheError, CacheKeyFactory, CacheSystem, CacheSystemStats, DefaultCacheKeyFactory};
use crate::config::PipelineConfig;
use crate::decoder::{DefaultImageDecoder, ImageDecoder};
use crate::executor::ExecutorSupplier;
use crate::fetch::{Fetcher, FetcherRegistry};
use crate::producers::{
    MultiplexStats, ProducerContext, ProducerListener, Shareable, SharedProducer,
    TracingProducerListener,
};
use crate::request::{CallerContext, ImageRequest, SourceType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Coalescing statistics of both multiplexers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescingStats {
    pub encoded: MultiplexStats,
    pub decoded: MultiplexStats,
}

/// Serves image requests through the cache tiers, fetching and decoding
/// only what is missing.
///
/// Must be built inside a Tokio runtime; all stage work runs on worker pools
/// spawned onto it.
pub struct ImagePipeline {
    config: PipelineConfig,
    cache: Arc<CacheSystem>,
    key_factory: Arc<dyn CacheKeyFactory>,
    executors: Arc<ExecutorSupplier>,
    listener: Arc<dyn ProducerListener>,
    sequences: ProducerSequences,
}

impl ImagePipeline {
    pub fn builder(config: PipelineConfig) -> ImagePipelineBuilder {
        ImagePipelineBuilder::new(config)
    }

    fn submit<T: Shareable + Send + Sync + 'static>(
        &self,
        producer: &SharedProducer<T>,
        request: ImageRequest,
        caller: Option<CallerContext>,
        is_prefetch: bool,
    ) -> DataSource<T> {
        let context = Arc::new(
            ProducerContext::new(request, caller, Arc::clone(&self.listener))
                .with_prefetch(is_prefetch),
        );
        debug!(
            request_id = %context.id(),
            uri = context.request().uri(),
            level = ?context.lowest_permitted_level(),
            prefetch = is_prefetch,
            "Submitting request"
        );
        let (events, receiver) = mpsc::unbounded_channel();
        producer.produce_results(Arc::new(ChannelConsumer::new(events)), Arc::clone(&context));
        DataSource::new(receiver, context)
    }

    /// Fetch, decode and postprocess an image, using every cache tier the
    /// request permits.
    pub fn fetch_decoded_image(
        &self,
        request: ImageRequest,
        caller: Option<CallerContext>,
    ) -> DataSource<ImageRef> {
        self.submit(&self.sequences.decoded, request, caller, false)
    }

    /// Fetch the encoded bytes of an image without decoding them.
    pub fn fetch_encoded_image(
        &self,
        request: ImageRequest,
        caller: Option<CallerContext>,
    ) -> DataSource<EncodedImage> {
        self.submit(&self.sequences.encoded, request, caller, false)
    }

    /// Make sure the encoded bytes are on disk. Completes with `Final(None)`.
    pub fn prefetch_to_disk_cache(
        &self,
        request: ImageRequest,
        caller: Option<CallerContext>,
    ) -> DataSource<()> {
        self.submit(&self.sequences.disk_prefetch, request, caller, true)
    }

    /// Make sure the decoded image is in memory. Completes with `Final(None)`.
    pub fn prefetch_to_bitmap_cache(
        &self,
        request: ImageRequest,
        caller: Option<CallerContext>,
    ) -> DataSource<()> {
        self.submit(&self.sequences.bitmap_prefetch, request, caller, true)
    }

    /// Whether the image this request would be served is in the decoded
    /// memory cache. Postprocessed output is checked when the request's
    /// postprocessor is cacheable.
    pub fn is_in_bitmap_memory_cache(&self, request: &ImageRequest) -> bool {
        let postprocessed = request.postprocessor().and_then(|postprocessor| {
            self.key_factory
                .postprocessed_key(request, postprocessor.as_ref(), None)
        });
        let key = postprocessed
            .unwrap_or_else(|| self.key_factory.decoded_key(request, None, request.resize()));
        self.cache.bitmap_cache().contains(&key)
    }

    /// Whether the request's encoded bytes are in its disk partition,
    /// including writes not yet flushed.
    pub fn is_in_disk_cache(&self, request: &ImageRequest) -> bool {
        let key = self.key_factory.encoded_key(request, None);
        self.cache
            .disk_for(request.cache_choice())
            .contains_sync(&key)
    }

    /// Drop every memory entry derived from `uri`. Returns the number of
    /// entries removed.
    pub fn evict_from_memory_cache(&self, uri: &str) -> usize {
        let removed = self.cache.evict_from_memory(uri);
        debug!(uri, removed, "Evicted from memory caches");
        removed
    }

    /// Remove the request's encoded bytes from both disk partitions.
    pub async fn evict_from_disk_cache(&self, request: &ImageRequest) -> Result<(), CacheError> {
        let key = self.key_factory.encoded_key(request, None);
        self.cache.evict_from_disk(&key).await
    }

    /// Evict from memory and disk.
    pub async fn evict_from_cache(&self, request: &ImageRequest) -> Result<(), CacheError> {
        self.evict_from_memory_cache(request.uri());
        self.evict_from_disk_cache(request).await
    }

    pub fn clear_memory_caches(&self) {
        self.cache.clear_memory();
    }

    pub async fn clear_disk_caches(&self) -> Result<(), CacheError> {
        self.cache.clear_disk().await
    }

    pub async fn clear_caches(&self) -> Result<(), CacheError> {
        self.clear_memory_caches();
        self.clear_disk_caches().await
    }

    /// Wait until staged disk writes have been flushed, or `timeout` passes.
    /// Returns whether everything was flushed.
    pub async fn flush_disk_writes(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.cache.pending_disk_writes();
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(pending, "Disk writes still pending after flush timeout");
                return false;
            }
            tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
        }
    }

    pub fn cache_stats(&self) -> CacheSystemStats {
        self.cache.stats()
    }

    pub fn coalescing_stats(&self) -> CoalescingStats {
        CoalescingStats {
            encoded: self.sequences.encoded_multiplex.stats(),
            decoded: self.sequences.decoded_multiplex.stats(),
        }
    }

    /// Log cache and coalescing statistics.
    pub fn log_stats(&self) {
        self.cache.log_stats();
        self.sequences.encoded_multiplex.log_stats();
        self.sequences.decoded_multiplex.log_stats();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop accepting work on every pool. Requests waiting for a worker fail.
    pub fn shutdown(&self) {
        info!("Shutting down image pipeline");
        self.executors.shutdown();
    }
}

/// Builds an [`ImagePipeline`], defaulting every collaborator not supplied.
pub struct ImagePipelineBuilder {
    config: PipelineConfig,
    cache: Option<Arc<CacheSystem>>,
    key_factory: Option<Arc<dyn CacheKeyFactory>>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    fetchers: Option<FetcherRegistry>,
    extra_fetchers: Vec<(SourceType, Arc<dyn Fetcher>)>,
    listener: Option<Arc<dyn ProducerListener>>,
}

impl ImagePipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: None,
            key_factory: None,
            decoder: None,
            fetchers: None,
            extra_fetchers: Vec::new(),
            listener: None,
        }
    }

    /// Use existing cache tiers instead of opening them from the config.
    pub fn with_cache(mut self, cache: Arc<CacheSystem>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_key_factory(mut self, key_factory: Arc<dyn CacheKeyFactory>) -> Self {
        self.key_factory = Some(key_factory);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Replace the default fetchers.
    pub fn with_fetchers(mut self, fetchers: FetcherRegistry) -> Self {
        self.fetchers = Some(fetchers);
        self
    }

    /// Register a fetcher for one source type on top of the others.
    pub fn with_fetcher(mut self, kind: SourceType, fetcher: Arc<dyn Fetcher>) -> Self {
        self.extra_fetchers.push((kind, fetcher));
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// # Errors
    ///
    /// Fails outside a Tokio runtime, when a disk partition cannot be opened,
    /// or when the default HTTP client cannot be created.
    pub fn build(self) -> Result<ImagePipeline, BuildError> {
        let executors = Arc::new(ExecutorSupplier::from_current(&self.config.executor)?);
        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(CacheSystem::new(&self.config.cache, &executors)?),
        };
        let mut fetchers = match self.fetchers {
            Some(fetchers) => fetchers,
            None => FetcherRegistry::with_defaults()?,
        };
        for (kind, fetcher) in self.extra_fetchers {
            fetchers = fetchers.with_fetcher(kind, fetcher);
        }
        let key_factory: Arc<dyn CacheKeyFactory> = match self.key_factory {
            Some(key_factory) => key_factory,
            None => Arc::new(DefaultCacheKeyFactory),
        };
        let decoder: Arc<dyn ImageDecoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(DefaultImageDecoder::new()),
        };
        let listener: Arc<dyn ProducerListener> = match self.listener {
            Some(listener) => listener,
            None => Arc::new(TracingProducerListener::new()),
        };

        let sequences = ProducerSequences::build(SequenceParts {
            cache: Arc::clone(&cache),
            key_factory: Arc::clone(&key_factory),
            decoder,
            fetchers: Arc::new(fetchers),
            executors: Arc::clone(&executors),
            progressive: self.config.progressive,
        });

        info!(
            progressive = self.config.progressive.enabled,
            "Image pipeline ready"
        );

        Ok(ImagePipeline {
            config: self.config,
            cache,
            key_factory,
            executors,
            listener,
            sequences,
        })
    }
}
