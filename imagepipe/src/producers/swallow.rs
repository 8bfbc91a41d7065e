//! Result-discarding stage used by prefetches.

use super::consumer::{Consumer, SharedConsumer, Status};
use super::context::ProducerContext;
use super::{Producer, SharedProducer};
use crate::error::PipelineError;
use std::marker::PhantomData;
use std::sync::Arc;

/// Runs the input for its caching side effects and reports only completion.
///
/// Intermediates are dropped; the final result arrives as an empty final
/// result. Failures and cancellation pass through.
pub struct SwallowResultProducer<T> {
    input: SharedProducer<T>,
}

impl<T> SwallowResultProducer<T> {
    pub fn new(input: SharedProducer<T>) -> Self {
        Self { input }
    }
}

impl<T: Send + Sync + 'static> Producer<()> for SwallowResultProducer<T> {
    fn produce_results(&self, consumer: SharedConsumer<()>, context: Arc<ProducerContext>) {
        let swallow = Arc::new(SwallowConsumer {
            outer: consumer,
            _value: PhantomData,
        });
        self.input.produce_results(swallow, context);
    }
}

struct SwallowConsumer<T> {
    outer: SharedConsumer<()>,
    _value: PhantomData<fn(&T)>,
}

impl<T> Consumer<T> for SwallowConsumer<T> {
    fn on_new_result(&self, _result: Option<&T>, status: Status) {
        if status.is_last() {
            self.outer.on_new_result(None, status);
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
    use crate::artifact::EncodedImage;
    use crate::producers::consumer::testing::{RecordingConsumer, Seen};
    use crate::producers::test_support::{context, FnProducer};
    use crate::request::ImageRequest;

    #[test]
    fn test_only_completion_is_reported() {
        let input = FnProducer::new(|consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_new_result(Some(&EncodedImage::partial(vec![1u8])), Status::NO_FLAGS);
            consumer.on_progress_update(0.5);
            consumer.on_new_result(Some(&EncodedImage::from_bytes(vec![1u8, 2])), Status::IS_LAST);
        });
        let consumer = RecordingConsumer::<()>::new();

        SwallowResultProducer::<EncodedImage>::new(input)
            .produce_results(consumer.clone(), context(ImageRequest::new("file:///x.png")));

        assert_eq!(
            consumer.seen(),
            vec![Seen::Result {
                has_value: false,
                status: Status::IS_LAST
            }]
        );
        assert_eq!(consumer.progress(), vec![0.5]);
    }

    #[test]
    fn test_failure_passes_through() {
        let input = FnProducer::new(|consumer: SharedConsumer<EncodedImage>, _ctx| {
            consumer.on_failure(PipelineError::Cancelled);
        });
        let consumer = RecordingConsumer::<()>::new();

        SwallowResultProducer::<EncodedImage>::new(input)
            .produce_results(consumer.clone(), context(ImageRequest::new("file:///x.png")));

        assert_eq!(consumer.seen(), vec![Seen::Failure]);
    }
}
