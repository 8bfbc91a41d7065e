//! Decoded memory cache stage.

use super::consumer::{Consumer, ConsumerGuard, SharedConsumer, Status};
use super::context::ProducerContext;
use super::listener::ExtraMap;
use super::{Producer, SharedProducer};
use crate::artifact::{DecodedImage, ImageRef};
use crate::cache::{CacheKey, CacheKeyFactory, CacheSystem, MemoryCache};
use crate::error::PipelineError;
use crate::request::RequestLevel;
use std::sync::Arc;
use tracing::trace;

pub const PRODUCER_NAME: &str = "BitmapMemoryCacheProducer";

const EXTRA_CACHED_VALUE_FOUND: &str = "cached_value_found";

/// Which key a [`BitmapMemoryCacheProducer`] looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapCacheKeyKind {
    /// The decoded image at the request's target size.
    Decoded,
    /// The output of the request's postprocessor. Requests without a
    /// cacheable postprocessor bypass the stage.
    Postprocessed,
}

/// Serves decoded images from memory.
///
/// A full-quality hit ends the request. A lower-quality hit is delivered as
/// an intermediate while the input works on something better. Unless the
/// stage is read-only, results coming back from the input are cached and
/// the cached handle is forwarded in their place.
pub struct BitmapMemoryCacheProducer {
    input: SharedProducer<ImageRef>,
    cache: Arc<CacheSystem>,
    key_factory: Arc<dyn CacheKeyFactory>,
    kind: BitmapCacheKeyKind,
    read_only: bool,
}

impl BitmapMemoryCacheProducer {
    pub fn new(
        input: SharedProducer<ImageRef>,
        cache: Arc<CacheSystem>,
        key_factory: Arc<dyn CacheKeyFactory>,
        kind: BitmapCacheKeyKind,
    ) -> Self {
        Self {
            input,
            cache,
            key_factory,
            kind,
            read_only: false,
        }
    }

    /// Look up only; never write results from the input.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn key(&self, context: &ProducerContext) -> Option<CacheKey> {
        let request = context.request();
        match self.kind {
            BitmapCacheKeyKind::Decoded => Some(self.key_factory.decoded_key(
                request,
                context.caller(),
                request.resize(),
            )),
            BitmapCacheKeyKind::Postprocessed => {
                request.postprocessor().and_then(|postprocessor| {
                    self.key_factory.postprocessed_key(
                        request,
                        postprocessor.as_ref(),
                        context.caller(),
                    )
                })
            }
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

fn is_full_quality(handle: &ImageRef) -> bool {
    handle
        .get()
        .is_some_and(|image| image.quality().full_quality)
}

impl Producer<ImageRef> for BitmapMemoryCacheProducer {
    fn produce_results(&self, consumer: SharedConsumer<ImageRef>, context: Arc<ProducerContext>) {
        let Some(key) = self.key(&context) else {
            self.input.produce_results(consumer, context);
            return;
        };

        let id = context.id();
        let listener = Arc::clone(context.listener());
        listener.on_producer_start(id, PRODUCER_NAME);

        let memory = Arc::clone(self.cache.bitmap_cache());
        if let Some(cached) = memory.get(&key) {
            if is_full_quality(&cached) {
                trace!(request_id = %id, key = %key, "Decoded memory cache hit");
                finish(&context, true);
                listener.on_ultimate_producer_reached(id, PRODUCER_NAME, true);
                consumer.on_progress_update(1.0);
                consumer.on_new_result(Some(&cached), Status::IS_LAST);
                return;
            }
            trace!(request_id = %id, key = %key, "Partial decoded memory cache hit");
            consumer.on_new_result(Some(&cached), Status::NO_FLAGS);
        }

        if context.lowest_permitted_level() >= RequestLevel::BitmapMemoryCache {
            finish(&context, false);
            listener.on_ultimate_producer_reached(id, PRODUCER_NAME, false);
            consumer.on_new_result(None, Status::IS_LAST);
            return;
        }

        finish(&context, false);
        let consumer: SharedConsumer<ImageRef> = if self.read_only {
            consumer
        } else {
            Arc::new(BitmapCacheConsumer {
                outer: ConsumerGuard::new(consumer),
                memory,
                key,
            })
        };
        self.input.produce_results(consumer, context);
    }
}

struct BitmapCacheConsumer {
    outer: ConsumerGuard<ImageRef>,
    memory: Arc<MemoryCache<DecodedImage>>,
    key: CacheKey,
}

impl BitmapCacheConsumer {
    /// A cached value at least as good as `incoming`, if there is one.
    fn better_cached(&self, incoming: &DecodedImage) -> Option<ImageRef> {
        let existing = self.memory.get(&self.key)?;
        let quality = existing.get()?.quality();
        (quality.full_quality || quality.quality >= incoming.quality().quality).then_some(existing)
    }
}

impl Consumer<ImageRef> for BitmapCacheConsumer {
    fn on_new_result(&self, result: Option<&ImageRef>, status: Status) {
        let (handle, image) = match result.and_then(|handle| handle.get().map(|i| (handle, i))) {
            Some(found)
                if !status.intersects(Status::IS_PLACEHOLDER | Status::IS_PARTIAL_RESULT) =>
            {
                found
            }
            _ => {
                self.outer.on_new_result(result, status);
                return;
            }
        };

        if status.is_not_last() {
            if let Some(existing) = self.better_cached(image) {
                self.outer.on_new_result(Some(&existing), status);
                return;
            }
        }

        let cached = self.memory.put(self.key.clone(), handle);
        if status.is_last() {
            self.outer.on_progress_update(1.0);
        }
        self.outer
            .on_new_result(Some(cached.as_ref().unwrap_or(handle)), status);
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
