//! Semaphore-bounded worker pool for one work class.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::trace;

/// Cost class of a unit of pipeline work.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum WorkClass {
    Network,
    DiskIo,
    Decode,
    Light,
}

impl fmt::Display for WorkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::DiskIo => write!(f, "disk_io"),
            Self::Decode => write!(f, "decode"),
            Self::Light => write!(f, "light"),
        }
    }
}

/// Errors from submitting work to a pool.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// No tokio runtime to spawn onto
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// The pool was shut down before the task got a worker
    #[error("Worker pool '{0}' is shut down")]
    Shutdown(WorkClass),

    /// The task panicked or was aborted
    #[error("Task in pool '{class}' failed: {message}")]
    TaskFailed { class: WorkClass, message: String },
}

#[derive(Debug)]
struct PoolInner {
    class: WorkClass,
    handle: Handle,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicU64,
}

impl PoolInner {
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ExecutorError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecutorError::Shutdown(self.class))
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }
}

/// Tracks one running task; decrements the in-flight count on drop.
struct InFlightGuard {
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl InFlightGuard {
    fn new(pool: Arc<PoolInner>, permit: OwnedSemaphorePermit) -> Self {
        let current = pool.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        pool.update_peak(current);
        Self {
            pool,
            _permit: permit,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.pool.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A bounded pool of workers for one [`WorkClass`].
///
/// At most `capacity` tasks run at once; further submissions wait for a
/// permit without blocking the submitter. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool spawning onto `handle`. A capacity of 0 is raised to 1.
    pub fn new(class: WorkClass, handle: Handle, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PoolInner {
                class,
                handle,
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Run an async task once a worker is free.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<Result<F::Output, ExecutorError>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let pool = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let permit = pool.acquire().await?;
            let _guard = InFlightGuard::new(Arc::clone(&pool), permit);
            trace!(pool = %pool.class, "Task started");
            Ok(task.await)
        })
    }

    /// Run a blocking closure on the runtime's blocking threads once a worker
    /// is free.
    pub fn spawn_blocking<F, R>(&self, work: F) -> JoinHandle<Result<R, ExecutorError>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let pool = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let permit = pool.acquire().await?;
            let _guard = InFlightGuard::new(Arc::clone(&pool), permit);
            pool.handle
                .spawn_blocking(work)
                .await
                .map_err(|e| ExecutorError::TaskFailed {
                    class: pool.class,
                    message: e.to_string(),
                })
        })
    }

    /// Stop handing out workers. Queued tasks fail with
    /// [`ExecutorError::Shutdown`]; running tasks finish.
    pub fn shutdown(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    /// Runtime the pool spawns onto.
    pub fn runtime(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn class(&self) -> WorkClass {
        self.inner.class
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }
}
