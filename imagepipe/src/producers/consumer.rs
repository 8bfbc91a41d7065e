//! Consumers: the sinks stages deliver results into.

use crate::artifact::EncodedImage;
use crate::error::PipelineError;
use crate::resource::ResourceHandle;
use bitflags::bitflags;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

bitflags! {
    /// Flags describing one delivered result.
    ///
    /// Flags are per result, not per request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// No further results follow
        const IS_LAST = 1;
        /// The value must not be written to any encoded cache
        const DO_NOT_CACHE_ENCODED = 1 << 1;
        /// A stand-in shown until real data arrives
        const IS_PLACEHOLDER = 1 << 2;
        /// Progressive or otherwise incomplete data
        const IS_PARTIAL_RESULT = 1 << 3;
    }
}

impl Status {
    pub const NO_FLAGS: Status = Status::empty();

    /// `IS_LAST` or no flags.
    pub fn simple(is_last: bool) -> Self {
        if is_last {
            Self::IS_LAST
        } else {
            Self::NO_FLAGS
        }
    }

    pub fn is_last(self) -> bool {
        self.contains(Self::IS_LAST)
    }

    pub fn is_not_last(self) -> bool {
        !self.is_last()
    }
}

/// Receives the results of one request from one stage.
///
/// Zero or more intermediate results are followed by exactly one terminal
/// event: a result with [`Status::IS_LAST`], a failure, or a cancellation.
/// Nothing is delivered after the terminal event.
///
/// Results are lent for the duration of the call. A consumer that keeps one
/// takes its own reference with [`Shareable::share`].
pub trait Consumer<T>: Send + Sync {
    fn on_new_result(&self, result: Option<&T>, status: Status);

    fn on_failure(&self, error: PipelineError);

    fn on_cancellation(&self);

    /// Progress between 0.0 and 1.0.
    fn on_progress_update(&self, _progress: f32) {}
}

pub type SharedConsumer<T> = Arc<dyn Consumer<T>>;

/// Values a consumer can keep beyond the delivering call.
pub trait Shareable: Sized {
    /// A new reference to the same value, or `None` if it was released.
    fn share(&self) -> Option<Self>;
}

impl Shareable for EncodedImage {
    fn share(&self) -> Option<Self> {
        self.try_clone().ok()
    }
}

impl<T: Send + Sync + 'static> Shareable for ResourceHandle<T> {
    fn share(&self) -> Option<Self> {
        self.acquire()
    }
}

impl Shareable for () {
    fn share(&self) -> Option<Self> {
        Some(())
    }
}

/// Forwards to an outer consumer and enforces the terminal-event contract:
/// once a terminal event has passed, everything else is dropped.
///
/// Every stage wraps the consumer it forwards to in one of these.
pub struct ConsumerGuard<T> {
    inner: SharedConsumer<T>,
    finished: AtomicBool,
}

impl<T> ConsumerGuard<T> {
    pub fn new(inner: SharedConsumer<T>) -> Self {
        Self {
            inner,
            finished: AtomicBool::new(false),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Claim the terminal event. Returns false if one was already delivered.
    fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }
}

impl<T> Consumer<T> for ConsumerGuard<T> {
    fn on_new_result(&self, result: Option<&T>, status: Status) {
        if status.is_last() {
            if self.finish() {
                self.inner.on_new_result(result, status);
            }
        } else if !self.is_finished() {
            self.inner.on_new_result(result, status);
        }
    }

    fn on_failure(&self, error: PipelineError) {
        if self.finish() {
            self.inner.on_failure(error);
        }
    }

    fn on_cancellation(&self) {
        if self.finish() {
            self.inner.on_cancellation();
        }
    }

    fn on_progress_update(&self, progress: f32) {
        if !self.is_finished() {
            self.inner.on_progress_update(progress);
        }
    }
}
