//! Postprocessing stage.

use super::consumer::{Consumer, ConsumerGuard, SharedConsumer, Status};
use super::context::ProducerContext;
use super::job_queue::LatestJobQueue;
use super::listener::ExtraMap;
use super::{submit_blocking, Producer, SharedProducer};
use crate::artifact::ImageRef;
use crate::error::PipelineError;
use crate::executor::{ExecutorSupplier, WorkerPool};
use crate::postprocess::Postprocessor;
use crate::resource::{ResourceError, ResourceHandle};
use std::sync::{Arc, Weak};
use tracing::debug;

pub const PRODUCER_NAME: &str = "PostprocessorProducer";

const EXTRA_POSTPROCESSOR: &str = "postprocessor";

/// Runs the request's postprocessor over decoded results on the light pool.
///
/// Requests without a postprocessor pass straight through. Scheduling
/// matches decoding: one job at a time, newest intermediate wins.
pub struct PostprocessorProducer {
    input: SharedProducer<ImageRef>,
    executors: Arc<ExecutorSupplier>,
}

impl PostprocessorProducer {
    pub fn new(input: SharedProducer<ImageRef>, executors: Arc<ExecutorSupplier>) -> Self {
        Self { input, executors }
    }
}

impl Producer<ImageRef> for PostprocessorProducer {
    fn produce_results(&self, consumer: SharedConsumer<ImageRef>, context: Arc<ProducerContext>) {
        let Some(postprocessor) = context.request().postprocessor().cloned() else {
            self.input.produce_results(consumer, context);
            return;
        };

        context.listener().on_producer_start(context.id(), PRODUCER_NAME);
        let postprocess_consumer = Arc::new_cyclic(|me| PostprocessConsumer {
            me: me.clone(),
            outer: ConsumerGuard::new(consumer),
            context: Arc::clone(&context),
            postprocessor,
            pool: self.executors.for_light_work().clone(),
            queue: LatestJobQueue::new(),
        });
        self.input.produce_results(postprocess_consumer, context);
    }
}

struct PostprocessConsumer {
    me: Weak<PostprocessConsumer>,
    outer: ConsumerGuard<ImageRef>,
    context: Arc<ProducerContext>,
    postprocessor: Arc<dyn Postprocessor>,
    pool: WorkerPool,
    queue: LatestJobQueue<ImageRef>,
}

impl PostprocessConsumer {
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
        while let Some((source, status)) = self.queue.next() {
            if self.context.is_cancelled() {
                self.queue.close();
                self.outer.on_cancellation();
                return;
            }
            self.process(&source, status);
        }
    }

    fn process(&self, source: &ImageRef, status: Status) {
        let id = self.context.id();
        let name = self.postprocessor.name().to_string();
        let result = source
            .get()
            .ok_or_else(|| PipelineError::from(ResourceError::AlreadyClosed))
            .and_then(|image| {
                self.postprocessor
                    .process(image)
                    .map(|output| {
                        output
                            .with_quality(image.quality())
                            .with_rotation_angle(image.rotation_angle())
                    })
                    .map_err(|e| PipelineError::Postprocess {
                        name: name.clone(),
                        message: e.to_string(),
                    })
            });

        match result {
            Ok(output) => {
                if status.is_last() {
                    let listener = self.context.listener();
                    let extra = listener.requires_extra_map(id).then(|| {
                        let mut extra = ExtraMap::new();
                        extra.insert(EXTRA_POSTPROCESSOR, name);
                        extra
                    });
                    listener.on_producer_finish_with_success(id, PRODUCER_NAME, extra.as_ref());
                }
                self.outer
                    .on_new_result(Some(&ResourceHandle::new(output)), status);
            }
            Err(error) if status.is_not_last() => {
                debug!(request_id = %id, error = %error, "Skipping failed intermediate postprocess");
            }
            Err(error) => {
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

impl Consumer<ImageRef> for PostprocessConsumer {
    fn on_new_result(&self, result: Option<&ImageRef>, status: Status) {
        let Some(source) = result else {
            if status.is_last() {
                self.queue.close();
                self.outer.on_new_result(None, status);
            }
            return;
        };

        let source = match source.try_acquire() {
            Ok(source) => source,
            Err(_) if status.is_not_last() => return,
            Err(error) => {
                self.fail(error.into());
                return;
            }
        };
        if self.queue.offer(source, status) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{DecodedImage, QualityInfo};
    use crate::postprocess::{FnPostprocessor, PostprocessError};
    use crate::producers::consumer::testing::{RecordingConsumer, Seen};
    use crate::producers::test_support::{context, decoded, executors, FnProducer};
    use crate::request::ImageRequest;
    use image::Rgba;

    const URI: &str = "https://x.test/p.png";

    fn decoder() -> Arc<FnProducer<ImageRef>> {
        FnProducer::new(|consumer: SharedConsumer<ImageRef>, _ctx| {
            consumer.on_new_result(Some(&decoded(3, 3, QualityInfo::FULL)), Status::IS_LAST);
        })
    }

    fn whiten() -> Arc<FnPostprocessor> {
        Arc::new(FnPostprocessor::new("whiten", |source: &DecodedImage| {
            let mut pixels = source.pixels().clone();
            for pixel in pixels.pixels_mut() {
                *pixel = Rgba([255, 255, 255, 255]);
            }
            Ok(DecodedImage::new(pixels, source.format()))
        }))
    }

    #[tokio::test]
    async fn test_applies_postprocessor() {
        let producer = PostprocessorProducer::new(decoder(), executors());
        let consumer = RecordingConsumer::new();

        producer.produce_results(
            consumer.clone(),
            context(ImageRequest::new(URI).with_postprocessor(whiten())),
        );
        consumer.wait_terminal().await;

        assert_eq!(
            consumer.final_value(|h| *h.get().unwrap().pixels().get_pixel(1, 1)),
            Some(Rgba([255, 255, 255, 255]))
        );
    }

    #[tokio::test]
    async fn test_without_postprocessor_passes_through() {
        let input = decoder();
        let producer = PostprocessorProducer::new(input.clone(), executors());
        let consumer = RecordingConsumer::new();

        producer.produce_results(consumer.clone(), context(ImageRequest::new(URI)));

        assert_eq!(input.calls(), 1);
        assert_eq!(
            consumer.final_value(|h| *h.get().unwrap().pixels().get_pixel(0, 0)),
            Some(Rgba([1, 2, 3, 255]))
        );
    }

    #[tokio::test]
    async fn test_final_failure_reported() {
        let failing = Arc::new(FnPostprocessor::new("broken", |_: &DecodedImage| {
            Err(PostprocessError::new("no"))
        }));
        let producer = PostprocessorProducer::new(decoder(), executors());
        let consumer = RecordingConsumer::new();

        producer.produce_results(
            consumer.clone(),
            context(ImageRequest::new(URI).with_postprocessor(failing)),
        );
        consumer.wait_terminal().await;

        assert_eq!(consumer.seen(), vec![Seen::Failure]);
        assert!(matches!(
            consumer.failure(),
            Some(PipelineError::Postprocess { name, .. }) if name == "broken"
        ));
    }
}
