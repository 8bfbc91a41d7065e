//! Encoded memory cache stage.

use super::consumer::{Consumer, ConsumerGuard, SharedConsumer, Status};
use super::context::ProducerContext;
use super::listener::ExtraMap;
use super::{Producer, SharedProducer};
use crate::artifact::EncodedImage;
use crate::cache::{CacheKey, CacheKeyFactory, CacheSystem, MemoryCache};
use crate::error::PipelineError;
use crate::request::RequestLevel;
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

pub const PRODUCER_NAME: &str = "EncodedMemoryCacheProducer";

const EXTRA_CACHED_VALUE_FOUND: &str = "cached_value_found";

/// Serves encoded bytes from memory, and caches complete bytes coming back
/// from the stages below.
///
/// The cache holds only the buffer; format and dimensions are parsed again
/// on a hit.
pub struct EncodedMemoryCacheProducer {
    input: SharedProducer<EncodedImage>,
    cache: Arc<CacheSystem>,
    key_factory: Arc<dyn CacheKeyFactory>,
}

impl EncodedMemoryCacheProducer {
    pub fn new(
        input: SharedProducer<EncodedImage>,
        cache: Arc<CacheSystem>,
        key_factory: Arc<dyn CacheKeyFactory>,
    ) -> Self {
        Self {
            input,
            cache,
            key_factory,
        }
    }
}

fn finish(context: &ProducerContext, found: bool) {
    let extra = context.listener().requires_extra_map(context.id()).then(|| {
        let mut extra = ExtraMap::new();
        extra.insert(EXTRA_CACHED_VALUE_FOUND, found.to_string());
        extra
    });
    context
        .listener()
        .on_producer_finish_with_success(context.id(), PRODUCER_NAME, extra.as_ref());
}

impl Producer<EncodedImage> for EncodedMemoryCacheProducer {
    fn produce_results(
        &self,
        consumer: SharedConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        let id = context.id();
        let listener = Arc::clone(context.listener());
        listener.on_producer_start(id, PRODUCER_NAME);

        let key = self
            .key_factory
            .encoded_key(context.request(), context.caller());
        let memory = Arc::clone(self.cache.encoded_cache());

        if let Some(buffer) = memory.get(&key) {
            trace!(request_id = %id, key = %key, "Encoded memory cache hit");
            let image = EncodedImage::new(buffer);
            finish(&context, true);
            listener.on_ultimate_producer_reached(id, PRODUCER_NAME, true);
            consumer.on_progress_update(1.0);
            consumer.on_new_result(Some(&image), Status::IS_LAST);
            return;
        }

        finish(&context, false);
        if context.lowest_permitted_level() >= RequestLevel::EncodedMemoryCache {
            listener.on_ultimate_producer_reached(id, PRODUCER_NAME, false);
            consumer.on_new_result(None, Status::IS_LAST);
            return;
        }

        let consumer = Arc::new(EncodedCacheConsumer {
            outer: ConsumerGuard::new(consumer),
            memory,
            key,
        });
        self.input.produce_results(consumer, context);
    }
}

struct EncodedCacheConsumer {
    outer: ConsumerGuard<EncodedImage>,
    memory: Arc<MemoryCache<Bytes>>,
    key: CacheKey,
}

impl Consumer<EncodedImage> for EncodedCacheConsumer {
    fn on_new_result(&self, result: Option<&EncodedImage>, status: Status) {
        let image = match result {
            Some(image)
                if status.is_last()
                    && image.is_complete()
                    && !status.intersects(
                        Status::DO_NOT_CACHE_ENCODED | Status::IS_PARTIAL_RESULT,
                    ) =>
            {
                image
            }
            _ => {
                self.outer.on_new_result(result, status);
                return;
            }
        };

        match self.memory.put(self.key.clone(), image.buffer()) {
            Some(cached) => {
                let shared = EncodedImage::from_parts(
                    cached,
                    image.format(),
                    image.dimensions(),
                    image.rotation_angle(),
                );
                self.outer.on_new_result(Some(&shared), status);
            }
            None => self.outer.on_new_result(result, status),
        }
    }

    fn on_failure(&self, error: PipelineError) {
        self.outer.on_failure(error);
    }

    fn on_cancellation(&self) {
        self.outer.on_cancellation();
    }

    fn on_progress_update(&self, progress: f32) {
        self.outer.on_progress_update(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DefaultCacheKeyFactory;
    use crate::producers::consumer::testing::{RecordingConsumer, Seen};
    use crate::producers::test_support::{cache_system, context, FnProducer, RecordingDiskTier};
    use crate::request::ImageRequest;
    use crate::resource::ResourceHandle;

    const URI: &str = "https://x.test/b.gif";

    fn setup(
        final_status: Status,
    ) -> (
        Arc<CacheSystem>,
        Arc<FnProducer<EncodedImage>>,
        EncodedMemoryCacheProducer,
    ) {
        let cache = cache_system(RecordingDiskTier::new(), RecordingDiskTier::new());
        let input = FnProducer::new(move |consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_new_result(Some(&EncodedImage::partial(vec![1u8])), Status::NO_FLAGS);
            consumer.on_new_result(Some(&EncodedImage::from_bytes(vec![1u8, 2, 3])), final_status);
        });
        let producer = EncodedMemoryCacheProducer::new(
            input.clone(),
            cache.clone(),
            Arc::new(DefaultCacheKeyFactory),
        );
        (cache, input, producer)
    }

    #[test]
    fn test_miss_caches_final_and_forwards_cached_handle() {
        let (cache, input, producer) = setup(Status::IS_LAST);
        let consumer = RecordingConsumer::new();

        producer.produce_results(consumer.clone(), context(ImageRequest::new(URI)));

        assert_eq!(input.calls(), 1);
        assert_eq!(consumer.seen().len(), 2);
        let cached = cache.encoded_cache().get(&CacheKey::simple(URI)).unwrap();
        assert_eq!(&cached.get().unwrap()[..], &[1, 2, 3]);
        assert_eq!(
            consumer.final_value(|e| e.buffer().shares_value_with(&cached)),
            Some(true)
        );
    }

    #[test]
    fn test_hit_skips_input() {
        let (cache, input, producer) = setup(Status::IS_LAST);
        cache.encoded_cache().put(
            CacheKey::simple(URI),
            &ResourceHandle::new(Bytes::from_static(b"GIF89a")),
        );
        let consumer = RecordingConsumer::new();

        producer.produce_results(consumer.clone(), context(ImageRequest::new(URI)));

        assert_eq!(input.calls(), 0);
        assert_eq!(consumer.progress(), vec![1.0]);
        assert_eq!(
            consumer.final_value(|e| e.format()),
            Some(crate::artifact::ImageFormat::Gif)
        );
    }

    #[test]
    fn test_partial_and_uncacheable_results_not_stored() {
        for status in [
            Status::IS_LAST | Status::IS_PARTIAL_RESULT,
            Status::IS_LAST | Status::DO_NOT_CACHE_ENCODED,
        ] {
            let (cache, _, producer) = setup(status);
            let consumer = RecordingConsumer::new();
            producer.produce_results(consumer.clone(), context(ImageRequest::new(URI)));

            assert_eq!(cache.encoded_cache().entry_count(), 0);
            assert_eq!(consumer.terminal_count(), 1);
        }
    }

    #[test]
    fn test_encoded_level_miss_ends_empty() {
        let (_, input, producer) = setup(Status::IS_LAST);
        let consumer = RecordingConsumer::new();

        producer.produce_results(
            consumer.clone(),
            context(
                ImageRequest::new(URI)
                    .with_lowest_permitted_level(RequestLevel::EncodedMemoryCache),
            ),
        );

        assert_eq!(input.calls(), 0);
        assert_eq!(
            consumer.seen(),
            vec![Seen::Result {
                has_value: false,
                status: Status::IS_LAST
            }]
        );
    }
}
