//! Integration tests for the image pipeline.
//!
//! These tests drive the public facade end to end with an in-process fetcher:
//! - decoded and encoded fetches through every tier
//! - request coalescing of concurrent identical requests
//! - request levels stopping short of the network
//! - prefetching, disk persistence across pipelines, and eviction
//! - cancellation and failure delivery

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use imagepipe::artifact::{DecodedImage, EncodedImage, QualityInfo};
use imagepipe::cache::CacheConfig;
use imagepipe::config::PipelineConfig;
use imagepipe::decoder::{DecodeError, DefaultImageDecoder, ImageDecoder};
use imagepipe::fetch::{ByteStream, FetchError, Fetcher, FetcherRegistry};
use imagepipe::pipeline::{ImagePipeline, PipelineEvent};
use imagepipe::postprocess::FnPostprocessor;
use imagepipe::request::{
    DecodeOptions, ImageRequest, ImageSource, RequestLevel, ResizeOptions, SourceType,
};
use imagepipe::{ErrorKind, PipelineError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const URI: &str = "https://images.example.com/photo.png";

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Clone, Copy)]
enum Behaviour {
    /// Deliver the body in one chunk after a delay
    Serve(Duration),
    /// Fail with an HTTP status
    Fail(u16),
    /// Never produce anything
    Hang,
}

/// A fetcher that counts how often it is asked for data.
struct CountingFetcher {
    body: Bytes,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn new(body: Vec<u8>, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            body: Bytes::from(body),
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for CountingFetcher {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, source: &ImageSource) -> ByteStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Serve(delay) => {
                let body = self.body.clone();
                stream::once(async move {
                    tokio::time::sleep(delay).await;
                    Ok(body)
                })
                .boxed()
            }
            Behaviour::Fail(status) => stream::iter(vec![Err(FetchError::Http {
                uri: source.uri().to_string(),
                status,
            })])
            .boxed(),
            Behaviour::Hang => stream::pending().boxed(),
        }
    }
}

/// The default decoder, counting how often it runs.
#[derive(Default)]
struct CountingDecoder {
    inner: DefaultImageDecoder,
    calls: AtomicUsize,
}

impl CountingDecoder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(
        &self,
        encoded: &EncodedImage,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(encoded, length, quality, options)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn pipeline(dir: &TempDir, fetcher: Arc<CountingFetcher>) -> ImagePipeline {
    let config = PipelineConfig::default()
        .with_cache(CacheConfig::default().with_directory(dir.path().to_path_buf()));
    ImagePipeline::builder(config)
        .with_fetchers(FetcherRegistry::new().with_fetcher(SourceType::Network, fetcher))
        .build()
        .unwrap()
}

fn serving(width: u32, height: u32) -> Arc<CountingFetcher> {
    CountingFetcher::new(
        png_bytes(width, height),
        Behaviour::Serve(Duration::from_millis(20)),
    )
}

// =============================================================================
// Fetching
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decoded_fetch_then_memory_hit() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(8, 6);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let first = pipeline
        .fetch_decoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap()
        .expect("decoded image");
    let image = first.get().unwrap();
    assert_eq!((image.width(), image.height()), (8, 6));
    assert!(image.quality().full_quality);

    assert!(pipeline.is_in_bitmap_memory_cache(&ImageRequest::new(URI)));
    assert!(pipeline.is_in_disk_cache(&ImageRequest::new(URI)));

    let second = pipeline
        .fetch_decoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap()
        .expect("cached image");
    assert_eq!(second.get().unwrap().width(), 8);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_encoded_fetch_returns_source_bytes() {
    let dir = TempDir::new().unwrap();
    let body = png_bytes(4, 4);
    let fetcher = CountingFetcher::new(body.clone(), Behaviour::Serve(Duration::ZERO));
    let pipeline = pipeline(&dir, fetcher);

    let encoded = pipeline
        .fetch_encoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap()
        .expect("encoded image");

    assert_eq!(&encoded.bytes().unwrap()[..], body.as_slice());
    assert_eq!(encoded.size(), body.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resized_request_is_cached_separately() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(40, 20);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));
    let small = ImageRequest::new(URI).with_resize(ResizeOptions::new(10, 10));

    let image = pipeline
        .fetch_decoded_image(small.clone(), None)
        .result()
        .await
        .unwrap()
        .unwrap();
    let image = image.get().unwrap();
    assert!(image.width() <= 10 && image.height() <= 10);

    assert!(pipeline.is_in_bitmap_memory_cache(&small));
    assert!(!pipeline.is_in_bitmap_memory_cache(&ImageRequest::new(URI)));

    // Same encoded bytes serve the full-size request.
    pipeline
        .fetch_decoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_postprocessed_output_cached_under_its_own_key() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(4, 4);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));
    let invert = FnPostprocessor::new("invert", |source: &DecodedImage| {
        let mut pixels = source.pixels().clone();
        for pixel in pixels.pixels_mut() {
            pixel.0 = [255 - pixel[0], 255 - pixel[1], 255 - pixel[2], pixel[3]];
        }
        Ok(DecodedImage::new(pixels, source.format()))
    })
    .with_cache_key("invert");
    let request = ImageRequest::new(URI).with_postprocessor(Arc::new(invert));

    let image = pipeline
        .fetch_decoded_image(request.clone(), None)
        .result()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(image.get().unwrap().pixels().get_pixel(0, 0).0, [55, 155, 205, 255]);
    assert!(pipeline.is_in_bitmap_memory_cache(&request));

    let again = pipeline
        .fetch_decoded_image(request, None)
        .result()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.get().unwrap().pixels().get_pixel(0, 0).0, [55, 155, 205, 255]);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_reaches_one_before_final() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir, serving(4, 4));

    let mut source = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    let mut last_progress = 0.0f32;
    let mut got_final = false;
    while let Some(event) = source.next_event().await {
        match event {
            PipelineEvent::Progress(p) => {
                assert!(p >= last_progress);
                last_progress = p;
            }
            PipelineEvent::Final(image) => {
                assert!(image.is_some());
                got_final = true;
            }
            PipelineEvent::Intermediate(_) => {}
            PipelineEvent::Failure(e) => panic!("unexpected failure: {e}"),
            PipelineEvent::Cancelled => panic!("unexpected cancellation"),
        }
    }

    assert!(got_final);
    assert_eq!(last_progress, 1.0);
    assert!(source.is_finished());
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_identical_requests_share_one_fetch() {
    let dir = TempDir::new().unwrap();
    let fetcher = CountingFetcher::new(
        png_bytes(8, 8),
        Behaviour::Serve(Duration::from_millis(100)),
    );
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let a = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    let b = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    let (a, b) = tokio::join!(a.result(), b.result());

    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    assert_eq!(fetcher.calls(), 1);

    let stats = pipeline.coalescing_stats();
    assert_eq!(stats.decoded.total_requests, 2);
    assert_eq!(stats.decoded.coalesced_requests, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_identical_requests_decode_once_and_share_the_image() {
    let dir = TempDir::new().unwrap();
    let fetcher = CountingFetcher::new(
        png_bytes(8, 8),
        Behaviour::Serve(Duration::from_millis(100)),
    );
    let decoder = Arc::new(CountingDecoder::default());
    let config = PipelineConfig::default()
        .with_cache(CacheConfig::default().with_directory(dir.path().to_path_buf()));
    let pipeline = ImagePipeline::builder(config)
        .with_fetchers(FetcherRegistry::new().with_fetcher(SourceType::Network, fetcher.clone()))
        .with_decoder(decoder.clone())
        .build()
        .unwrap();

    let sources: Vec<_> = (0..6)
        .map(|_| pipeline.fetch_decoded_image(ImageRequest::new(URI), None))
        .collect();
    let handles: Vec<_> = join_all(sources.into_iter().map(|source| source.result()))
        .await
        .into_iter()
        .map(|result| result.unwrap().expect("final image"))
        .collect();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(decoder.calls(), 1);
    for (i, handle) in handles.iter().enumerate() {
        assert!(
            handle.shares_value_with(&handles[0]),
            "request {i} got a different image"
        );
    }
    assert_eq!(pipeline.coalescing_stats().decoded.coalesced_requests, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelling_one_subscriber_keeps_shared_work() {
    let dir = TempDir::new().unwrap();
    let fetcher = CountingFetcher::new(
        png_bytes(8, 8),
        Behaviour::Serve(Duration::from_millis(100)),
    );
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let cancelled = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    let survivor = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    cancelled.cancel();

    assert!(matches!(
        cancelled.result().await,
        Err(PipelineError::Cancelled)
    ));
    assert!(survivor.result().await.unwrap().is_some());
    assert_eq!(fetcher.calls(), 1);
}

// =============================================================================
// Request levels, prefetch and eviction
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disk_level_miss_never_fetches() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(4, 4);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let request = ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::DiskCache);
    let result = pipeline
        .fetch_decoded_image(request, None)
        .result()
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefetch_to_disk_then_disk_level_hit() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(6, 6);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let prefetched = pipeline
        .prefetch_to_disk_cache(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap();
    assert!(prefetched.is_none());
    assert!(pipeline.is_in_disk_cache(&ImageRequest::new(URI)));
    assert!(!pipeline.is_in_bitmap_memory_cache(&ImageRequest::new(URI)));

    pipeline.clear_memory_caches();
    let request = ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::DiskCache);
    let image = pipeline
        .fetch_decoded_image(request, None)
        .result()
        .await
        .unwrap()
        .expect("served from disk");

    assert_eq!(image.get().unwrap().width(), 6);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefetch_to_bitmap_cache() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(3, 3);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    pipeline
        .prefetch_to_bitmap_cache(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap();

    assert!(pipeline.is_in_bitmap_memory_cache(&ImageRequest::new(URI)));
    let request =
        ImageRequest::new(URI).with_lowest_permitted_level(RequestLevel::BitmapMemoryCache);
    assert!(pipeline
        .fetch_decoded_image(request, None)
        .result()
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disk_cache_survives_pipeline_restart() {
    let dir = TempDir::new().unwrap();

    let first = pipeline(&dir, serving(5, 5));
    first
        .prefetch_to_disk_cache(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap();
    assert!(first.flush_disk_writes(Duration::from_secs(5)).await);
    first.shutdown();

    let fetcher = serving(5, 5);
    let second = pipeline(&dir, Arc::clone(&fetcher));
    assert!(second.is_in_disk_cache(&ImageRequest::new(URI)));

    let image = second
        .fetch_decoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(image.get().unwrap().height(), 5);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_evict_removes_every_tier() {
    let dir = TempDir::new().unwrap();
    let fetcher = serving(4, 4);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));
    let request = ImageRequest::new(URI);

    pipeline
        .fetch_decoded_image(request.clone(), None)
        .result()
        .await
        .unwrap();
    assert!(pipeline.flush_disk_writes(Duration::from_secs(5)).await);
    pipeline.evict_from_cache(&request).await.unwrap();

    assert!(!pipeline.is_in_bitmap_memory_cache(&request));
    assert!(!pipeline.is_in_disk_cache(&request));

    pipeline
        .fetch_decoded_image(request, None)
        .result()
        .await
        .unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disk_cache_disabled_request_skips_disk() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir, serving(4, 4));
    let request = ImageRequest::new(URI).with_disk_cache_enabled(false);

    pipeline
        .fetch_decoded_image(request.clone(), None)
        .result()
        .await
        .unwrap();

    assert!(!pipeline.is_in_disk_cache(&ImageRequest::new(URI)));
    assert!(pipeline.is_in_bitmap_memory_cache(&request));
}

// =============================================================================
// Failure and cancellation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_failure_reaches_caller() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir, CountingFetcher::new(Vec::new(), Behaviour::Fail(404)));

    let error = pipeline
        .fetch_decoded_image(ImageRequest::new(URI), None)
        .result()
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::IoFailure);
    assert!(matches!(
        error,
        PipelineError::Fetch(FetchError::Http { status: 404, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stalled_fetch() {
    let dir = TempDir::new().unwrap();
    let fetcher = CountingFetcher::new(Vec::new(), Behaviour::Hang);
    let pipeline = pipeline(&dir, Arc::clone(&fetcher));

    let source = pipeline.fetch_decoded_image(ImageRequest::new(URI), None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), source.result())
        .await
        .expect("cancellation delivered");
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsupported_source_fails() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir, serving(1, 1));

    let error = pipeline
        .fetch_encoded_image(ImageRequest::new("ftp://example.com/a.png"), None)
        .result()
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::Fetch(FetchError::UnsupportedSource { .. })
    ));
}
