//! Per-request execution context shared by every stage.

use super::listener::ProducerListener;
use crate::request::{CallerContext, ImageRequest, Priority, RequestLevel};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// State of one request, shared by all of its stages.
///
/// Everything except the cancellation flag, the priority, the prefetch flag
/// and the lowest permitted level is fixed at creation. Stages read those
/// mutable fields at the moment they decide, never caching them.
pub struct ProducerContext {
    id: RequestId,
    request: ImageRequest,
    caller: Option<CallerContext>,
    lowest_permitted_level: AtomicU8,
    priority: AtomicU8,
    is_prefetch: AtomicBool,
    cancellation: CancellationToken,
    listener: Arc<dyn ProducerListener>,
}

impl ProducerContext {
    /// Context for a newly submitted request. Level and priority come from
    /// the request.
    pub fn new(
        request: ImageRequest,
        caller: Option<CallerContext>,
        listener: Arc<dyn ProducerListener>,
    ) -> Self {
        Self {
            id: RequestId::next(),
            lowest_permitted_level: AtomicU8::new(request.lowest_permitted_level().as_u8()),
            priority: AtomicU8::new(request.priority().as_u8()),
            is_prefetch: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
            request,
            caller,
            listener,
        }
    }

    pub fn with_prefetch(self, is_prefetch: bool) -> Self {
        self.is_prefetch.store(is_prefetch, Ordering::Relaxed);
        self
    }

    /// A context for work shared between subscribers: same request identity
    /// and listener, its own cancellation.
    pub(crate) fn fork(&self) -> Self {
        Self {
            id: self.id,
            request: self.request.clone(),
            caller: self.caller.clone(),
            lowest_permitted_level: AtomicU8::new(self.lowest_permitted_level().as_u8()),
            priority: AtomicU8::new(self.priority().as_u8()),
            is_prefetch: AtomicBool::new(self.is_prefetch()),
            cancellation: CancellationToken::new(),
            listener: Arc::clone(&self.listener),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request(&self) -> &ImageRequest {
        &self.request
    }

    pub fn caller(&self) -> Option<&CallerContext> {
        self.caller.as_ref()
    }

    pub fn listener(&self) -> &Arc<dyn ProducerListener> {
        &self.listener
    }

    pub fn lowest_permitted_level(&self) -> RequestLevel {
        RequestLevel::from_u8(self.lowest_permitted_level.load(Ordering::Acquire))
    }

    pub fn set_lowest_permitted_level(&self, level: RequestLevel) {
        self.lowest_permitted_level
            .store(level.as_u8(), Ordering::Release);
    }

    pub fn priority(&self) -> Priority {
        Priority::from_u8(self.priority.load(Ordering::Acquire))
    }

    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.as_u8(), Ordering::Release);
    }

    pub fn is_prefetch(&self) -> bool {
        self.is_prefetch.load(Ordering::Acquire)
    }

    pub fn set_is_prefetch(&self, is_prefetch: bool) {
        self.is_prefetch.store(is_prefetch, Ordering::Release);
    }

    /// Request cancellation. Idempotent and callable from any thread.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for ProducerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerContext")
            .field("id", &self.id)
            .field("uri", &self.request.uri())
            .field("lowest_permitted_level", &self.lowest_permitted_level())
            .field("priority", &self.priority())
            .field("is_prefetch", &self.is_prefetch())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
