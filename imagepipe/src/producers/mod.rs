//! Producer stages and the consumer contract between them.
//!
//! A request is served by a chain of [`Producer`]s. Each stage either answers
//! from its own tier or forwards to the stage it wraps, passing down a
//! consumer that intercepts results on their way back out:
//!
//! ```text
//! BitmapMemoryCache(read-only) -> Multiplex(decoded) -> BitmapMemoryCache
//!   -> Decode -> Multiplex(encoded) -> EncodedMemoryCache
//!   -> DiskCacheRead -> DiskCacheWrite -> NetworkFetch
//! ```
//!
//! Every stage delivers zero or more intermediate results followed by
//! exactly one terminal event, and checks the shared [`ProducerContext`]
//! for cancellation before expensive work.

mod bitmap_cache;
mod consumer;
mod context;
mod decode;
mod disk_read;
mod disk_write;
mod encoded_cache;
mod fetch;
mod job_queue;
pub mod listener;
mod multiplex;
mod postprocess;
mod swallow;

#[cfg(test)]
pub(crate) mod test_support;

pub use bitmap_cache::{BitmapCacheKeyKind, BitmapMemoryCacheProducer};
pub use consumer::{Consumer, ConsumerGuard, Shareable, SharedConsumer, Status};
pub use context::{ProducerContext, RequestId};
pub use decode::DecodeProducer;
pub use disk_read::DiskCacheReadProducer;
pub use disk_write::DiskCacheWriteProducer;
pub use encoded_cache::EncodedMemoryCacheProducer;
pub use fetch::{calculate_progress, NetworkFetchProducer};
pub use listener::{NoOpProducerListener, ProducerListener, TracingProducerListener};
pub use multiplex::{MultiplexProducer, MultiplexStats};
pub use postprocess::PostprocessorProducer;
pub use swallow::SwallowResultProducer;

use crate::error::PipelineError;
use crate::executor::{ExecutorError, WorkerPool};
use std::future::Future;
use std::sync::Arc;

/// One stage of the pipeline.
///
/// `produce_results` returns promptly; any slow work is submitted to a
/// worker pool and results are delivered from there.
pub trait Producer<T>: Send + Sync {
    fn produce_results(&self, consumer: SharedConsumer<T>, context: Arc<ProducerContext>);
}

pub type SharedProducer<T> = Arc<dyn Producer<T>>;

/// Run `task` on `pool`. If the pool refuses or loses the task,
/// `on_rejected` receives the error so the request still terminates.
pub(crate) fn submit<F, R>(pool: &WorkerPool, task: F, on_rejected: R)
where
    F: Future<Output = ()> + Send + 'static,
    R: FnOnce(PipelineError) + Send + 'static,
{
    let class = pool.class();
    let handle = pool.spawn(task);
    pool.runtime().spawn(async move {
        let error = match handle.await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => ExecutorError::TaskFailed {
                class,
                message: e.to_string(),
            },
        };
        on_rejected(error.into());
    });
}

/// Blocking counterpart of [`submit`].
pub(crate) fn submit_blocking<F, R>(pool: &WorkerPool, work: F, on_rejected: R)
where
    F: FnOnce() + Send + 'static,
    R: FnOnce(PipelineError) + Send + 'static,
{
    let class = pool.class();
    let handle = pool.spawn_blocking(work);
    pool.runtime().spawn(async move {
        let error = match handle.await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => ExecutorError::TaskFailed {
                class,
                message: e.to_string(),
            },
        };
        on_rejected(error.into());
    });
}
