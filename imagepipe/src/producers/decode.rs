//! Decode stage.

use super::consumer::{Consumer, ConsumerGuard, SharedConsumer, Status};
use super::context::ProducerContext;
use super::job_queue::LatestJobQueue;
use super::listener::ExtraMap;
use super::{submit_blocking, Producer, SharedProducer};
use crate::artifact::{EncodedImage, ImageRef, QualityInfo};
use crate::decoder::ImageDecoder;
use crate::error::PipelineError;
use crate::executor::{ExecutorSupplier, WorkerPool};
use crate::resource::ResourceHandle;
use std::sync::{Arc, Weak};
use tracing::debug;

pub const PRODUCER_NAME: &str = "DecodeProducer";

const EXTRA_IMAGE_FORMAT: &str = "image_format";
const EXTRA_ENCODED_SIZE: &str = "encoded_size";
const EXTRA_BITMAP_SIZE: &str = "bitmap_size";

/// Decodes encoded results on the decode pool.
///
/// Only one decode per request runs at a time. Intermediate results of
/// progressive formats are decoded when the pool is free; an intermediate
/// that arrives while a decode is running replaces any older one still
/// waiting. A failed intermediate decode is skipped, a failed final decode
/// fails the request.
pub struct DecodeProducer {
    input: SharedProducer<EncodedImage>,
    decoder: Arc<dyn ImageDecoder>,
    executors: Arc<ExecutorSupplier>,
}

impl DecodeProducer {
    pub fn new(
        input: SharedProducer<EncodedImage>,
        decoder: Arc<dyn ImageDecoder>,
        executors: Arc<ExecutorSupplier>,
    ) -> Self {
        Self {
            input,
            decoder,
            executors,
        }
    }
}

impl Producer<ImageRef> for DecodeProducer {
    fn produce_results(&self, consumer: SharedConsumer<ImageRef>, context: Arc<ProducerContext>) {
        context.listener().on_producer_start(context.id(), PRODUCER_NAME);
        let decode_consumer = Arc::new_cyclic(|me| DecodeConsumer {
            me: me.clone(),
            outer: ConsumerGuard::new(consumer),
            context: Arc::clone(&context),
            decoder: Arc::clone(&self.decoder),
            pool: self.executors.for_decode().clone(),
            queue: LatestJobQueue::new(),
        });
        self.input.produce_results(decode_consumer, context);
    }
}

struct DecodeConsumer {
    me: Weak<DecodeConsumer>,
    outer: ConsumerGuard<ImageRef>,
    context: Arc<ProducerContext>,
    decoder: Arc<dyn ImageDecoder>,
    pool: WorkerPool,
    queue: LatestJobQueue<EncodedImage>,
}

impl DecodeConsumer {
    fn start_worker(&self) {
        let Some(worker) = self.me.upgrade() else {
            return;
        };
        let rejected = Arc::clone(&worker);
        submit_blocking(
            &self.pool,
            move || worker.drain(),
            move |error| rejected.fail(error),
        );
    }

    fn drain(&self) {
        while let Some((encoded, status)) = self.queue.next() {
            if self.context.is_cancelled() {
                self.queue.close();
                self.context
                    .listener()
                    .on_producer_finish_with_cancellation(self.context.id(), PRODUCER_NAME);
                self.outer.on_cancellation();
                return;
            }
            self.decode(&encoded, status);
        }
    }

    fn decode(&self, encoded: &EncodedImage, status: Status) {
        let id = self.context.id();
        let request = self.context.request();
        let is_last = status.is_last();
        let quality = if is_last {
            QualityInfo::FULL
        } else {
            QualityInfo::partial(encoded.size() as u32, false)
        };
        let options = request
            .decode_options()
            .clone()
            .with_target_size(request.resize());

        match self
            .decoder
            .decode(encoded, encoded.size(), quality, &options)
        {
            Ok(image) => {
                let angle = request.rotation().effective_angle(encoded.rotation_angle());
                let image = image.with_rotation_angle(angle);
                if is_last {
                    let listener = self.context.listener();
                    let extra = listener.requires_extra_map(id).then(|| {
                        let mut extra = ExtraMap::new();
                        extra.insert(EXTRA_IMAGE_FORMAT, encoded.format().to_string());
                        extra.insert(EXTRA_ENCODED_SIZE, encoded.size().to_string());
                        extra.insert(
                            EXTRA_BITMAP_SIZE,
                            format!("{}x{}", image.width(), image.height()),
                        );
                        extra
                    });
                    listener.on_producer_finish_with_success(id, PRODUCER_NAME, extra.as_ref());
                    self.outer.on_progress_update(1.0);
                }
                let handle = ResourceHandle::new(image);
                self.outer.on_new_result(Some(&handle), status);
            }
            Err(error) if !is_last => {
                debug!(request_id = %id, error = %error, "Skipping undecodable intermediate");
            }
            Err(error) => {
                let error = PipelineError::from(error);
                self.context
                    .listener()
                    .on_producer_finish_with_failure(id, PRODUCER_NAME, &error);
                self.outer.on_failure(error);
            }
        }
    }

    fn fail(&self, error: PipelineError) {
        self.queue.close();
        self.outer.on_failure(error);
    }
}

impl Consumer<EncodedImage> for DecodeConsumer {
    fn on_new_result(&self, result: Option<&EncodedImage>, status: Status) {
        let Some(encoded) = result else {
            if status.is_last() {
                self.queue.close();
                self.outer.on_new_result(None, status);
            }
            return;
        };

        if status.is_not_last() && !encoded.format().supports_progressive() {
            return;
        }

        let encoded = match encoded.try_clone() {
            Ok(encoded) => encoded,
            Err(_) if status.is_not_last() => return,
            Err(error) => {
                self.fail(error.into());
                return;
            }
        };
        if self.queue.offer(encoded, status) {
            self.start_worker();
        }
    }

    fn on_failure(&self, error: PipelineError) {
        self.queue.close();
        self.outer.on_failure(error);
    }

    fn on_cancellation(&self) {
        self.queue.close();
        self.outer.on_cancellation();
    }

    fn on_progress_update(&self, progress: f32) {
        self.outer.on_progress_update(progress);
    }
}
