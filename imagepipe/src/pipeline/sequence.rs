//! Assembly of the producer chains.

use crate::artifact::{EncodedImage, ImageRef};
use crate::cache::{CacheKeyFactory, CacheSystem};
use crate::config::ProgressiveConfig;
use crate::decoder::ImageDecoder;
use crate::executor::ExecutorSupplier;
use crate::fetch::FetcherRegistry;
use crate::producers::{
    BitmapCacheKeyKind, BitmapMemoryCacheProducer, DecodeProducer, DiskCacheReadProducer,
    DiskCacheWriteProducer, EncodedMemoryCacheProducer, MultiplexProducer, NetworkFetchProducer,
    PostprocessorProducer, SharedProducer, SwallowResultProducer,
};
use std::sync::Arc;

/// Everything the stages are built from.
pub(crate) struct SequenceParts {
    pub cache: Arc<CacheSystem>,
    pub key_factory: Arc<dyn CacheKeyFactory>,
    pub decoder: Arc<dyn ImageDecoder>,
    pub fetchers: Arc<FetcherRegistry>,
    pub executors: Arc<ExecutorSupplier>,
    pub progressive: ProgressiveConfig,
}

/// The chains serving each kind of request, built once per pipeline.
///
/// ```text
/// decoded:  BitmapMemoryCache(postprocessed) -> Postprocessor
///             -> BitmapMemoryCache(read-only) -> Multiplex(decoded)
///             -> BitmapMemoryCache -> Decode -> encoded
/// encoded:  Multiplex(encoded) -> EncodedMemoryCache -> DiskCacheRead
///             -> DiskCacheWrite -> NetworkFetch
/// ```
///
/// Both multiplexers are shared by every chain that passes through them, so
/// a prefetch and a fetch of the same image coalesce.
pub(crate) struct ProducerSequences {
    pub encoded: SharedProducer<EncodedImage>,
    pub decoded: SharedProducer<ImageRef>,
    pub disk_prefetch: SharedProducer<()>,
    pub bitmap_prefetch: SharedProducer<()>,
    pub encoded_multiplex: Arc<MultiplexProducer<EncodedImage>>,
    pub decoded_multiplex: Arc<MultiplexProducer<ImageRef>>,
}

impl ProducerSequences {
    pub fn build(parts: SequenceParts) -> Self {
        let SequenceParts {
            cache,
            key_factory,
            decoder,
            fetchers,
            executors,
            progressive,
        } = parts;

        let fetch: SharedProducer<EncodedImage> = Arc::new(NetworkFetchProducer::new(
            fetchers,
            Arc::clone(&executors),
            progressive,
        ));
        let disk_write: SharedProducer<EncodedImage> = Arc::new(DiskCacheWriteProducer::new(
            fetch,
            Arc::clone(&cache),
            Arc::clone(&key_factory),
        ));
        let disk_read: SharedProducer<EncodedImage> = Arc::new(DiskCacheReadProducer::new(
            disk_write,
            Arc::clone(&cache),
            Arc::clone(&key_factory),
            Arc::clone(&executors),
        ));
        let encoded_cache: SharedProducer<EncodedImage> = Arc::new(
            EncodedMemoryCacheProducer::new(disk_read, Arc::clone(&cache), Arc::clone(&key_factory)),
        );
        let encoded_multiplex = Arc::new(MultiplexProducer::encoded(
            encoded_cache,
            Arc::clone(&key_factory),
            Arc::clone(&executors),
        ));
        let encoded: SharedProducer<EncodedImage> = encoded_multiplex.clone();

        let decode: SharedProducer<ImageRef> = Arc::new(DecodeProducer::new(
            Arc::clone(&encoded),
            decoder,
            Arc::clone(&executors),
        ));
        let bitmap_cache: SharedProducer<ImageRef> = Arc::new(BitmapMemoryCacheProducer::new(
            decode,
            Arc::clone(&cache),
            Arc::clone(&key_factory),
            BitmapCacheKeyKind::Decoded,
        ));
        let decoded_multiplex = Arc::new(MultiplexProducer::decoded(
            bitmap_cache,
            Arc::clone(&key_factory),
            Arc::clone(&executors),
        ));
        let bitmap_get: SharedProducer<ImageRef> = Arc::new(
            BitmapMemoryCacheProducer::new(
                decoded_multiplex.clone(),
                Arc::clone(&cache),
                Arc::clone(&key_factory),
                BitmapCacheKeyKind::Decoded,
            )
            .read_only(),
        );
        let postprocess: SharedProducer<ImageRef> =
            Arc::new(PostprocessorProducer::new(bitmap_get, executors));
        let decoded: SharedProducer<ImageRef> = Arc::new(BitmapMemoryCacheProducer::new(
            postprocess,
            cache,
            key_factory,
            BitmapCacheKeyKind::Postprocessed,
        ));

        Self {
            disk_prefetch: Arc::new(SwallowResultProducer::new(Arc::clone(&encoded))),
            bitmap_prefetch: Arc::new(SwallowResultProducer::new(Arc::clone(&decoded))),
            encoded,
            decoded,
            encoded_multiplex,
            decoded_multiplex,
        }
    }
}
