//! Network fetch stage: the bottom of every chain.

use super::consumer::{SharedConsumer, Status};
use super::context::ProducerContext;
use super::listener::ExtraMap;
use super::{submit, Producer};
use crate::artifact::{EncodedImage, ImageFormat};
use crate::config::ProgressiveConfig;
use crate::error::PipelineError;
use crate::executor::ExecutorSupplier;
use crate::fetch::FetcherRegistry;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

pub const PRODUCER_NAME: &str = "NetworkFetchProducer";

const EXTRA_TOTAL_BYTES: &str = "total_bytes";
const EXTRA_SOURCE: &str = "source";

/// Bytes at which reported progress reaches about 63%.
const PROGRESS_SCALE_BYTES: f64 = 50_000.0;

/// Progress estimate for a download of unknown length.
///
/// Approaches 1.0 asymptotically; the final result reports 1.0 explicitly.
pub fn calculate_progress(downloaded: usize) -> f32 {
    (1.0 - (-(downloaded as f64) / PROGRESS_SCALE_BYTES).exp()) as f32
}

/// Leading bytes kept contiguous for format detection.
const HEADER_LEN: usize = 32;

/// Chunks received so far, kept as-is until a contiguous buffer is needed.
#[derive(Default)]
struct ReceivedBytes {
    chunks: Vec<Bytes>,
    len: usize,
    header: BytesMut,
}

impl ReceivedBytes {
    fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        let wanted = HEADER_LEN.saturating_sub(self.header.len()).min(chunk.len());
        self.header.extend_from_slice(&chunk[..wanted]);
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    fn len(&self) -> usize {
        self.len
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::detect(&self.header)
    }

    /// Everything received so far as one buffer.
    ///
    /// Chunks are copied at most once per call, and the result replaces them,
    /// so a snapshot with nothing new since the last one is free.
    fn snapshot(&mut self) -> Bytes {
        if self.chunks.len() > 1 {
            let mut joined = BytesMut::with_capacity(self.len);
            for chunk in &self.chunks {
                joined.extend_from_slice(chunk);
            }
            self.chunks = vec![joined.freeze()];
        }
        self.chunks.first().cloned().unwrap_or_default()
    }
}

/// Streams the source's bytes through the registered fetcher.
///
/// Emits progress after every chunk. When the request and the configuration
/// both allow progressive rendering and the data so far is JPEG, the bytes
/// received so far are also forwarded as intermediate results, at most once
/// per throttle interval.
pub struct NetworkFetchProducer {
    fetchers: Arc<FetcherRegistry>,
    executors: Arc<ExecutorSupplier>,
    progressive: ProgressiveConfig,
}

impl NetworkFetchProducer {
    pub fn new(
        fetchers: Arc<FetcherRegistry>,
        executors: Arc<ExecutorSupplier>,
        progressive: ProgressiveConfig,
    ) -> Self {
        Self {
            fetchers,
            executors,
            progressive,
        }
    }
}

impl Producer<EncodedImage> for NetworkFetchProducer {
    fn produce_results(
        &self,
        consumer: SharedConsumer<EncodedImage>,
        context: Arc<ProducerContext>,
    ) {
        let id = context.id();
        let listener = Arc::clone(context.listener());
        listener.on_producer_start(id, PRODUCER_NAME);

        let request = context.request();
        let progressive = self.progressive.enabled && request.is_progressive_rendering_enabled();
        let throttle = self.progressive.throttle();
        let mut stream = self.fetchers.fetch(request.source());
        let rejected = Arc::clone(&consumer);

        let task = async move {
            let token = context.cancellation_token().clone();
            let mut received = ReceivedBytes::default();
            let mut last_intermediate: Option<Instant> = None;

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(request_id = %id, received = received.len(), "Fetch cancelled");
                        listener.on_producer_finish_with_cancellation(id, PRODUCER_NAME);
                        consumer.on_cancellation();
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                match chunk {
                    None => break,
                    Some(Err(error)) => {
                        let error = PipelineError::from(error);
                        listener.on_producer_finish_with_failure(id, PRODUCER_NAME, &error);
                        listener.on_ultimate_producer_reached(id, PRODUCER_NAME, false);
                        consumer.on_failure(error);
                        return;
                    }
                    Some(Ok(bytes)) => {
                        received.push(bytes);
                        consumer.on_progress_update(calculate_progress(received.len()));

                        let due = last_intermediate.map_or(true, |at| at.elapsed() >= throttle);
                        if progressive && due && received.format() == ImageFormat::Jpeg {
                            last_intermediate = Some(Instant::now());
                            listener.on_producer_event(id, PRODUCER_NAME, "intermediate_result");
                            let partial = EncodedImage::partial(received.snapshot());
                            consumer.on_new_result(Some(&partial), Status::NO_FLAGS);
                        }
                    }
                }
            }

            let total = received.len();
            let image = EncodedImage::from_bytes(received.snapshot());
            let extra = listener.requires_extra_map(id).then(|| {
                let mut extra = ExtraMap::new();
                extra.insert(EXTRA_TOTAL_BYTES, total.to_string());
                extra.insert(EXTRA_SOURCE, context.request().uri().to_string());
                extra
            });
            debug!(request_id = %id, bytes = total, "Fetch complete");
            listener.on_producer_finish_with_success(id, PRODUCER_NAME, extra.as_ref());
            listener.on_ultimate_producer_reached(id, PRODUCER_NAME, true);
            consumer.on_progress_update(1.0);
            consumer.on_new_result(Some(&image), Status::IS_LAST);
        };

        submit(self.executors.for_network(), task, move |error| {
            rejected.on_failure(error)
        });
    }
}
