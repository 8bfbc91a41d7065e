//! Test doubles shared by the stage tests.

use super::consumer::SharedConsumer;
use super::context::ProducerContext;
use super::context::RequestId;
use super::listener::{ExtraMap, NoOpProducerListener, ProducerListener};
use super::Producer;
use crate::artifact::{DecodedImage, EncodedImage, ImageFormat, ImageRef, QualityInfo};
use crate::resource::ResourceHandle;
use crate::cache::{CacheError, CacheKey, CacheSystem, DiskCacheTier, MemoryCache};
use crate::executor::{ExecutorConfig, ExecutorSupplier};
use crate::request::ImageRequest;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn context(request: ImageRequest) -> Arc<ProducerContext> {
    Arc::new(ProducerContext::new(
        request,
        None,
        Arc::new(NoOpProducerListener),
    ))
}

pub fn context_with_listener(
    request: ImageRequest,
    listener: Arc<dyn ProducerListener>,
) -> Arc<ProducerContext> {
    Arc::new(ProducerContext::new(request, None, listener))
}

/// Listener that records every callback as `"<producer> <event>"`.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, producer: &str, event: String) {
        self.events.lock().push(format!("{producer} {event}"));
    }
}

impl ProducerListener for RecordingListener {
    fn on_producer_start(&self, _request_id: RequestId, producer: &'static str) {
        self.record(producer, "start".into());
    }

    fn on_producer_event(&self, _request_id: RequestId, producer: &'static str, event: &str) {
        self.record(producer, format!("event {event}"));
    }

    fn on_producer_finish_with_success(
        &self,
        _request_id: RequestId,
        producer: &'static str,
        extra: Option<&ExtraMap>,
    ) {
        let mut details: Vec<String> = extra
            .into_iter()
            .flatten()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        details.sort();
        self.record(producer, format!("success {}", details.join(",")).trim_end().to_string());
    }

    fn on_producer_finish_with_failure(
        &self,
        _request_id: RequestId,
        producer: &'static str,
        _error: &crate::error::PipelineError,
    ) {
        self.record(producer, "failure".into());
    }

    fn on_producer_finish_with_cancellation(&self, _request_id: RequestId, producer: &'static str) {
        self.record(producer, "cancellation".into());
    }

    fn on_ultimate_producer_reached(
        &self,
        _request_id: RequestId,
        producer: &'static str,
        successful: bool,
    ) {
        self.record(producer, format!("ultimate {successful}"));
    }

    fn requires_extra_map(&self, _request_id: RequestId) -> bool {
        true
    }
}

/// Worker pools on the test runtime.
pub fn executors() -> Arc<ExecutorSupplier> {
    Arc::new(ExecutorSupplier::from_current(&ExecutorConfig::default()).unwrap())
}

type ProduceFn<T> = dyn Fn(SharedConsumer<T>, Arc<ProducerContext>) + Send + Sync;

/// Producer driven by a closure, counting invocations.
pub struct FnProducer<T> {
    produce: Box<ProduceFn<T>>,
    calls: AtomicUsize,
}

impl<T: 'static> FnProducer<T> {
    pub fn new<F>(produce: F) -> Arc<Self>
    where
        F: Fn(SharedConsumer<T>, Arc<ProducerContext>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            produce: Box::new(produce),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: 'static> Producer<T> for FnProducer<T> {
    fn produce_results(&self, consumer: SharedConsumer<T>, context: Arc<ProducerContext>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.produce)(consumer, context);
    }
}

/// In-memory disk tier that records every interaction.
#[derive(Default)]
pub struct RecordingDiskTier {
    entries: Mutex<HashMap<CacheKey, Bytes>>,
    puts: Mutex<Vec<(CacheKey, Bytes)>>,
    gets: AtomicUsize,
    fail_reads: bool,
}

impl RecordingDiskTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_reads() -> Arc<Self> {
        Arc::new(Self {
            fail_reads: true,
            ..Self::default()
        })
    }

    pub fn insert(&self, key: CacheKey, bytes: &[u8]) {
        self.entries.lock().insert(key, Bytes::copy_from_slice(bytes));
    }

    pub fn puts(&self) -> Vec<(CacheKey, Bytes)> {
        self.puts.lock().clone()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of reads plus writes.
    pub fn interactions(&self) -> usize {
        self.gets() + self.puts.lock().len()
    }
}

impl DiskCacheTier for RecordingDiskTier {
    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<EncodedImage>, CacheError>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let result = if cancel.is_cancelled() {
            Err(CacheError::Cancelled)
        } else if self.fail_reads {
            Err(CacheError::Io(std::io::Error::other("disk unplugged")))
        } else {
            Ok(self
                .entries
                .lock()
                .get(key)
                .map(|bytes| EncodedImage::from_bytes(bytes.clone())))
        };
        futures::future::ready(result).boxed()
    }

    fn put(&self, key: CacheKey, image: &EncodedImage) {
        let bytes = image.bytes().cloned().unwrap_or_default();
        self.puts.lock().push((key.clone(), bytes.clone()));
        self.entries.lock().insert(key, bytes);
    }

    fn contains_sync(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn remove<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>> {
        self.entries.lock().remove(key);
        futures::future::ready(Ok(())).boxed()
    }

    fn clear_all(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        self.entries.lock().clear();
        futures::future::ready(Ok(())).boxed()
    }
}

/// Cache system over recording disk tiers and small memory tiers.
pub fn cache_system(
    default: Arc<RecordingDiskTier>,
    small: Arc<RecordingDiskTier>,
) -> Arc<CacheSystem> {
    Arc::new(CacheSystem::from_parts(
        Arc::new(MemoryCache::<DecodedImage>::new("bitmap", 64 << 20, 64)),
        Arc::new(MemoryCache::<Bytes>::new("encoded", 16 << 20, 64)),
        default,
        small,
    ))
}

/// A PNG of the given size filled with one colour.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// A decoded image handle of the given size and quality.
pub fn decoded(width: u32, height: u32, quality: QualityInfo) -> ImageRef {
    let pixels = image::RgbaImage::from_pixel(width, height, image::Rgba([1, 2, 3, 255]));
    ResourceHandle::new(DecodedImage::new(pixels, ImageFormat::Png).with_quality(quality))
}
