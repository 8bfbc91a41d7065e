//! Scoped reference-counted handle.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by misuse of a [`ResourceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The handle instance was already closed.
    #[error("resource handle already closed")]
    AlreadyClosed,
}

/// Callback invoked with the wrapped value once the last handle goes away.
pub trait ResourceReleaser<T>: Send + Sync {
    fn release(&self, value: T);
}

impl<T, F> ResourceReleaser<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn release(&self, value: T) {
        self(value)
    }
}

/// The shared allocation behind every handle copy.
struct SharedReference<T: Send + Sync + 'static> {
    value: Option<T>,
    releaser: Option<Arc<dyn ResourceReleaser<T>>>,
}

impl<T: Send + Sync + 'static> Drop for SharedReference<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            match self.releaser.take() {
                Some(releaser) => releaser.release(value),
                None => drop(value),
            }
        }
    }
}

/// Reference-counted handle over a shared, immutable value.
///
/// `try_acquire` produces a new handle sharing the same value; `close` (or
/// dropping the handle) gives up this copy. The value is released once the
/// count reaches zero and never before. Each instance may be closed once:
/// closing it again fails with [`ResourceError::AlreadyClosed`] rather than
/// touching the shared count.
pub struct ResourceHandle<T: Send + Sync + 'static> {
    shared: Option<Arc<SharedReference<T>>>,
}

impl<T: Send + Sync + 'static> ResourceHandle<T> {
    /// Wrap a value with no release callback.
    pub fn new(value: T) -> Self {
        Self {
            shared: Some(Arc::new(SharedReference {
                value: Some(value),
                releaser: None,
            })),
        }
    }

    /// Wrap a value, invoking `releaser` when the last handle goes away.
    pub fn with_releaser(value: T, releaser: Arc<dyn ResourceReleaser<T>>) -> Self {
        Self {
            shared: Some(Arc::new(SharedReference {
                value: Some(value),
                releaser: Some(releaser),
            })),
        }
    }

    /// Create another handle sharing this value.
    pub fn try_acquire(&self) -> Result<Self, ResourceError> {
        let shared = self.shared.as_ref().ok_or(ResourceError::AlreadyClosed)?;
        Ok(Self {
            shared: Some(Arc::clone(shared)),
        })
    }

    /// Like [`try_acquire`](Self::try_acquire) but returns `None` for a closed handle.
    pub fn acquire(&self) -> Option<Self> {
        self.try_acquire().ok()
    }

    /// Give up this copy of the value.
    pub fn close(&mut self) -> Result<(), ResourceError> {
        self.shared
            .take()
            .map(drop)
            .ok_or(ResourceError::AlreadyClosed)
    }

    /// Whether this instance still refers to the value.
    pub fn is_valid(&self) -> bool {
        self.shared.is_some()
    }

    /// Borrow the value; `None` once this handle is closed.
    pub fn get(&self) -> Option<&T> {
        self.shared.as_ref().and_then(|shared| shared.value.as_ref())
    }

    /// Number of open handles sharing the value (0 when closed).
    pub fn ref_count(&self) -> usize {
        self.shared.as_ref().map_or(0, Arc::strong_count)
    }

    /// Whether both handles refer to the same underlying allocation.
    pub fn shares_value_with(&self, other: &Self) -> bool {
        match (&self.shared, &other.shared) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("valid", &self.is_valid())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
