//! Write-through stage for the disk tiers.

use super::consumer::{Consumer, ConsumerGuard, SharedConsumer, Status};
use super::context::ProducerContext;
use super::listener::ExtraMap;
use super::{Producer, SharedProducer};
use crate::artifact::EncodedImage;
use crate::cache::{CacheKey, CacheKeyFactory, CacheSystem, DiskCacheTier};
use crate::error::PipelineError;
use crate::request::RequestLevel;
use std::sync::Arc;
use tracing::trace;

pub const PRODUCER_NAME: &str = "DiskCacheWriteProducer";

const EXTRA_WRITTEN: &str = "written";

fn finish(context: &ProducerContext, written: bool) {
    let extra = context.listener().requires_extra_map(context.id()).then(|| {
        let mut extra = ExtraMap::new();
        extra.insert(EXTRA_WRITTEN, written.to_string());
        extra
    });
    context
        .listener()
        .on_producer_finish_with_success(context.id(), PRODUCER_NAME, extra.as_ref());
}

/// Writes final encoded results to the disk partition chosen by the request.
///
/// Requests that may not go below the disk tier get an empty final result
/// without the input being touched. Otherwise the input always runs; its
/// final, complete, cacheable result is written before being forwarded
/// unchanged. The write never blocks or fails the forwarding.
pub struct DiskCacheWriteProducer {
    input: SharedProducer<EncodedImage>,
    cache: Arc<CacheSystem>,
    key_factory: Arc<dyn CacheKeyFactory>,
}

impl DiskCacheWriteProducer {
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

impl Producer<EncodedImage> for DiskCacheWriteProducer {
    fn produce_results(
        &self,
        consumer: SharedConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        let id = context.id();
        let listener = Arc::clone(context.listener());
        listener.on_producer_start(id, PRODUCER_NAME);

        if context.lowest_permitted_level() >= RequestLevel::DiskCache {
            trace!(request_id = %id, "Fetch not permitted; ending at disk write");
            finish(&context, false);
            listener.on_ultimate_producer_reached(id, PRODUCER_NAME, false);
            consumer.on_new_result(None, Status::IS_LAST);
            return;
        }

        let consumer: SharedConsumer<EncodedImage> = if context.request().is_disk_cache_enabled() {
            let request = context.request();
            Arc::new(DiskCacheWriteConsumer {
                outer: ConsumerGuard::new(consumer),
                tier: Arc::clone(self.cache.disk_for(request.cache_choice())),
                key: self.key_factory.encoded_key(request, context.caller()),
                context: Arc::clone(&context),
            })
        } else {
            finish(&context, false);
            consumer
        };

        self.input.produce_results(consumer, context);
    }
}

struct DiskCacheWriteConsumer {
    outer: ConsumerGuard<EncodedImage>,
    tier: Arc<dyn DiskCacheTier>,
    key: CacheKey,
    context: Arc<ProducerContext>,
}

impl Consumer<EncodedImage> for DiskCacheWriteConsumer {
    fn on_new_result(&self, result: Option<&EncodedImage>, status: Status) {
        let cacheable = status.is_last()
            && !status.intersects(Status::DO_NOT_CACHE_ENCODED | Status::IS_PARTIAL_RESULT);
        let mut written = false;
        if let (true, Some(image)) = (cacheable, result) {
            self.tier.put(self.key.clone(), image);
            written = true;
        }
        if status.is_last() {
            finish(&self.context, written);
        }
        self.outer.on_new_result(result, status);
    }

    fn on_failure(&self, error: PipelineError) {
        self.context.listener().on_producer_finish_with_failure(
            self.context.id(),
            PRODUCER_NAME,
            &error,
        );
        self.outer.on_failure(error);
    }

    fn on_cancellation(&self) {
        self.context
            .listener()
            .on_producer_finish_with_cancellation(self.context.id(), PRODUCER_NAME);
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
    use crate::producers::test_support::{
        cache_system, context, context_with_listener, FnProducer, RecordingDiskTier,
        RecordingListener,
    };
    use crate::request::{CacheChoice, ImageRequest};

    const URI: &str = "https://x.test/photo.jpg";

    struct Fixture {
        default: Arc<RecordingDiskTier>,
        small: Arc<RecordingDiskTier>,
        input: Arc<FnProducer<EncodedImage>>,
        producer: DiskCacheWriteProducer,
    }

    /// Input delivers one intermediate then `final_status`.
    fn fixture(final_status: Status) -> Fixture {
        let default = RecordingDiskTier::new();
        let small = RecordingDiskTier::new();
        let input = FnProducer::new(move |consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_new_result(Some(&EncodedImage::partial(vec![1u8, 2])), Status::NO_FLAGS);
            consumer.on_new_result(Some(&EncodedImage::from_bytes(vec![1u8, 2, 3, 4])), final_status);
        });
        let producer = DiskCacheWriteProducer::new(
            input.clone(),
            cache_system(default.clone(), small.clone()),
            Arc::new(DefaultCacheKeyFactory),
        );
        Fixture {
            default,
            small,
            input,
            producer,
        }
    }

    fn run(fixture: &Fixture, request: ImageRequest) -> Arc<RecordingConsumer<EncodedImage>> {
        let consumer = RecordingConsumer::new();
        fixture
            .producer
            .produce_results(consumer.clone(), context(request));
        consumer
    }

    #[test]
    fn test_small_choice_writes_final_to_small_tier_only() {
        let f = fixture(Status::IS_LAST);
        let consumer = run(&f, ImageRequest::new(URI).with_cache_choice(CacheChoice::Small));

        let puts = f.small.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, CacheKey::simple(URI));
        assert_eq!(&puts[0].1[..], &[1, 2, 3, 4]);
        assert!(f.default.puts().is_empty());

        assert_eq!(
            consumer.seen(),
            vec![
                Seen::Result {
                    has_value: true,
                    status: Status::NO_FLAGS
                },
                Seen::Result {
                    has_value: true,
                    status: Status::IS_LAST
                },
            ]
        );
        assert_eq!(consumer.final_value(|e| e.size()), Some(4));
    }

    #[test]
    fn test_default_choice_writes_to_default_tier() {
        let f = fixture(Status::IS_LAST);
        run(&f, ImageRequest::new(URI));

        assert_eq!(f.default.puts().len(), 1);
        assert!(f.small.puts().is_empty());
    }

    #[test]
    fn test_partial_final_result_not_written() {
        let f = fixture(Status::IS_LAST | Status::IS_PARTIAL_RESULT);
        let consumer = run(&f, ImageRequest::new(URI));

        assert!(f.default.puts().is_empty());
        assert_eq!(consumer.terminal_count(), 1);
    }

    #[test]
    fn test_do_not_cache_flag_respected() {
        let f = fixture(Status::IS_LAST | Status::DO_NOT_CACHE_ENCODED);
        run(&f, ImageRequest::new(URI));

        assert!(f.default.puts().is_empty());
    }

    #[test]
    fn test_disk_level_gate_ends_without_input() {
        let f = fixture(Status::IS_LAST);
        let consumer = run(
            &f,
            ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::DiskCache),
        );

        assert_eq!(
            consumer.seen(),
            vec![Seen::Result {
                has_value: false,
                status: Status::IS_LAST
            }]
        );
        assert_eq!(f.input.calls(), 0);
        assert_eq!(f.default.interactions() + f.small.interactions(), 0);
    }

    #[test]
    fn test_disabled_disk_cache_passes_through() {
        let f = fixture(Status::IS_LAST);
        let consumer = run(&f, ImageRequest::new(URI).with_disk_cache_enabled(false));

        assert_eq!(f.input.calls(), 1);
        assert!(f.default.puts().is_empty());
        assert_eq!(consumer.terminal_count(), 1);
    }

    #[test]
    fn test_failure_propagates_without_write() {
        let default = RecordingDiskTier::new();
        let input = FnProducer::new(|consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_new_result(Some(&EncodedImage::partial(vec![1u8])), Status::NO_FLAGS);
            consumer.on_failure(PipelineError::Cache("boom".into()));
        });
        let producer = DiskCacheWriteProducer::new(
            input,
            cache_system(default.clone(), RecordingDiskTier::new()),
            Arc::new(DefaultCacheKeyFactory),
        );
        let consumer = RecordingConsumer::new();
        producer.produce_results(consumer.clone(), context(ImageRequest::new(URI)));

        assert_eq!(
            consumer.seen(),
            vec![
                Seen::Result {
                    has_value: true,
                    status: Status::NO_FLAGS
                },
                Seen::Failure
            ]
        );
        assert!(default.puts().is_empty());
    }

    #[test]
    fn test_listener_sees_write_outcome() {
        let f = fixture(Status::IS_LAST);
        let listener = RecordingListener::new();
        f.producer.produce_results(
            RecordingConsumer::<EncodedImage>::new(),
            context_with_listener(ImageRequest::new(URI), listener.clone()),
        );

        assert_eq!(
            listener.events(),
            vec![
                "DiskCacheWriteProducer start",
                "DiskCacheWriteProducer success written=true"
            ]
        );
    }

    #[test]
    fn test_listener_sees_skipped_write() {
        let f = fixture(Status::IS_LAST | Status::IS_PARTIAL_RESULT);
        let listener = RecordingListener::new();
        f.producer.produce_results(
            RecordingConsumer::<EncodedImage>::new(),
            context_with_listener(ImageRequest::new(URI), listener.clone()),
        );

        assert_eq!(
            listener.events().last().map(String::as_str),
            Some("DiskCacheWriteProducer success written=false")
        );
    }

    #[test]
    fn test_listener_sees_gated_request_as_ultimate() {
        let f = fixture(Status::IS_LAST);
        let listener = RecordingListener::new();
        f.producer.produce_results(
            RecordingConsumer::<EncodedImage>::new(),
            context_with_listener(
                ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::DiskCache),
                listener.clone(),
            ),
        );

        assert_eq!(
            listener.events(),
            vec![
                "DiskCacheWriteProducer start",
                "DiskCacheWriteProducer success written=false",
                "DiskCacheWriteProducer ultimate false"
            ]
        );
    }
}
