//! Disk cache lookup stage.

use super::consumer::{SharedConsumer, Status};
use super::context::ProducerContext;
use super::listener::ExtraMap;
use super::{submit, Producer, SharedProducer};
use crate::artifact::EncodedImage;
use crate::cache::{CacheError, CacheKeyFactory, CacheSystem};
use crate::error::PipelineError;
use crate::executor::ExecutorSupplier;
use crate::request::RequestLevel;
use std::sync::Arc;
use tracing::{debug, warn};

pub const PRODUCER_NAME: &str = "DiskCacheReadProducer";

const EXTRA_CACHED_VALUE_FOUND: &str = "cached_value_found";
const EXTRA_ENCODED_SIZE: &str = "encoded_size";

/// Looks the encoded bytes up in the request's disk partition.
///
/// A hit is final. A miss continues to the input unless the request may not
/// go below the disk tier. A read error is treated as a miss: the failure is
/// reported to the listener and the input is tried instead.
pub struct DiskCacheReadProducer {
    input: SharedProducer<EncodedImage>,
    cache: Arc<CacheSystem>,
    key_factory: Arc<dyn CacheKeyFactory>,
    executors: Arc<ExecutorSupplier>,
}

impl DiskCacheReadProducer {
    pub fn new(
        input: SharedProducer<EncodedImage>,
        cache: Arc<CacheSystem>,
        key_factory: Arc<dyn CacheKeyFactory>,
        executors: Arc<ExecutorSupplier>,
    ) -> Self {
        Self {
            input,
            cache,
            key_factory,
            executors,
        }
    }
}

fn extras(context: &ProducerContext, found: bool, size: Option<usize>) -> Option<ExtraMap> {
    if !context.listener().requires_extra_map(context.id()) {
        return None;
    }
    let mut extra = ExtraMap::new();
    extra.insert(EXTRA_CACHED_VALUE_FOUND, found.to_string());
    if let Some(size) = size {
        extra.insert(EXTRA_ENCODED_SIZE, size.to_string());
    }
    Some(extra)
}

impl Producer<EncodedImage> for DiskCacheReadProducer {
    fn produce_results(
        &self,
        consumer: SharedConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        let request = context.request();
        if !request.is_disk_cache_enabled() {
            if context.lowest_permitted_level() >= RequestLevel::DiskCache {
                consumer.on_new_result(None, Status::IS_LAST);
            } else {
                self.input.produce_results(consumer, context);
            }
            return;
        }

        let listener = Arc::clone(context.listener());
        listener.on_producer_start(context.id(), PRODUCER_NAME);

        let tier = Arc::clone(self.cache.disk_for(request.cache_choice()));
        let key = self.key_factory.encoded_key(request, context.caller());
        let input = Arc::clone(&self.input);
        let rejected = Arc::clone(&consumer);

        let task = async move {
            let id = context.id();
            let token = context.cancellation_token().clone();
            match tier.get(&key, &token).await {
                Err(CacheError::Cancelled) => {
                    listener.on_producer_finish_with_cancellation(id, PRODUCER_NAME);
                    consumer.on_cancellation();
                }
                Err(error) => {
                    warn!(request_id = %id, key = %key, error = %error, "Disk cache read failed");
                    listener.on_producer_finish_with_failure(id, PRODUCER_NAME, &error.into());
                    input.produce_results(consumer, context);
                }
                Ok(Some(image)) => {
                    debug!(request_id = %id, key = %key, bytes = image.size(), "Disk cache hit");
                    let extra = extras(&context, true, Some(image.size()));
                    listener.on_producer_finish_with_success(id, PRODUCER_NAME, extra.as_ref());
                    listener.on_ultimate_producer_reached(id, PRODUCER_NAME, true);
                    consumer.on_progress_update(1.0);
                    consumer.on_new_result(Some(&image), Status::IS_LAST);
                }
                Ok(None) => {
                    let extra = extras(&context, false, None);
                    listener.on_producer_finish_with_success(id, PRODUCER_NAME, extra.as_ref());
                    if context.lowest_permitted_level() >= RequestLevel::DiskCache {
                        listener.on_ultimate_producer_reached(id, PRODUCER_NAME, false);
                        consumer.on_new_result(None, Status::IS_LAST);
                    } else {
                        input.produce_results(consumer, context);
                    }
                }
            }
        };

        submit(self.executors.for_light_work(), task, move |error: PipelineError| {
            rejected.on_failure(error)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, DefaultCacheKeyFactory};
    use crate::producers::consumer::testing::{RecordingConsumer, Seen};
    use crate::producers::test_support::{
        cache_system, context, executors, FnProducer, RecordingDiskTier,
    };
    use crate::request::{CacheChoice, ImageRequest};

    const URI: &str = "https://x.test/a.png";

    fn network() -> Arc<FnProducer<EncodedImage>> {
        FnProducer::new(|consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_new_result(Some(&EncodedImage::from_bytes(vec![9u8; 3])), Status::IS_LAST);
        })
    }

    fn producer(
        default: Arc<RecordingDiskTier>,
        small: Arc<RecordingDiskTier>,
        input: Arc<FnProducer<EncodedImage>>,
    ) -> DiskCacheReadProducer {
        DiskCacheReadProducer::new(
            input,
            cache_system(default, small),
            Arc::new(DefaultCacheKeyFactory),
            executors(),
        )
    }

    #[tokio::test]
    async fn test_hit_is_final_and_skips_input() {
        let default = RecordingDiskTier::new();
        default.insert(CacheKey::simple(URI), b"cached");
        let input = network();
        let consumer = RecordingConsumer::new();

        producer(default, RecordingDiskTier::new(), input.clone())
            .produce_results(consumer.clone(), context(ImageRequest::new(URI)));
        consumer.wait_terminal().await;

        assert_eq!(input.calls(), 0);
        assert_eq!(consumer.progress(), vec![1.0]);
        assert_eq!(consumer.final_value(|e| e.size()), Some(6));
    }

    #[tokio::test]
    async fn test_small_choice_reads_small_partition() {
        let default = RecordingDiskTier::new();
        let small = RecordingDiskTier::new();
        small.insert(CacheKey::simple(URI), b"tiny");
        let consumer = RecordingConsumer::new();

        producer(default.clone(), small.clone(), network()).produce_results(
            consumer.clone(),
            context(ImageRequest::new(URI).with_cache_choice(CacheChoice::Small)),
        );
        consumer.wait_terminal().await;

        assert_eq!(small.gets(), 1);
        assert_eq!(default.gets(), 0);
        assert_eq!(consumer.final_value(|e| e.size()), Some(4));
    }

    #[tokio::test]
    async fn test_miss_falls_through_to_input() {
        let input = network();
        let consumer = RecordingConsumer::new();

        producer(RecordingDiskTier::new(), RecordingDiskTier::new(), input.clone())
            .produce_results(consumer.clone(), context(ImageRequest::new(URI)));
        consumer.wait_terminal().await;

        assert_eq!(input.calls(), 1);
        assert_eq!(consumer.final_value(|e| e.size()), Some(3));
    }

    #[tokio::test]
    async fn test_miss_at_disk_level_ends_empty() {
        let input = network();
        let consumer = RecordingConsumer::new();

        producer(RecordingDiskTier::new(), RecordingDiskTier::new(), input.clone()).produce_results(
            consumer.clone(),
            context(ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::DiskCache)),
        );
        consumer.wait_terminal().await;

        assert_eq!(input.calls(), 0);
        assert_eq!(
            consumer.seen(),
            vec![Seen::Result {
                has_value: false,
                status: Status::IS_LAST
            }]
        );
    }

    #[tokio::test]
    async fn test_read_error_treated_as_miss() {
        let input = network();
        let consumer = RecordingConsumer::new();

        producer(RecordingDiskTier::failing_reads(), RecordingDiskTier::new(), input.clone())
            .produce_results(consumer.clone(), context(ImageRequest::new(URI)));
        consumer.wait_terminal().await;

        assert_eq!(input.calls(), 1);
        assert!(consumer.failure().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_request_reports_cancellation() {
        let default = RecordingDiskTier::new();
        default.insert(CacheKey::simple(URI), b"cached");
        let input = network();
        let consumer = RecordingConsumer::new();
        let ctx = context(ImageRequest::new(URI));
        ctx.cancel();

        producer(default, RecordingDiskTier::new(), input.clone())
            .produce_results(consumer.clone(), ctx);
        consumer.wait_terminal().await;

        assert_eq!(consumer.seen(), vec![Seen::Cancellation]);
        assert_eq!(input.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_disk_cache_skips_lookup() {
        let default = RecordingDiskTier::new();
        let input = network();
        let consumer = RecordingConsumer::new();

        producer(default.clone(), RecordingDiskTier::new(), input.clone()).produce_results(
            consumer.clone(),
            context(ImageRequest::new(URI).with_disk_cache_enabled(false)),
        );

        assert_eq!(default.gets(), 0);
        assert_eq!(input.calls(), 1);
        assert_eq!(consumer.terminal_count(), 1);
    }
}
