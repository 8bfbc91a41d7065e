//! Request coalescing.
//!
//! Concurrent requests for the same artifact at the same level share one
//! computation of the input chain:
//!
//! ```text
//! request A ─┐
//!            │
//! request B ─┼──► Multiplexer ──► input (runs once)
//!            │        │
//! request C ─┘        ▼
//!              [A, B, C receive every
//!               result the input delivers]
//! ```
//!
//! A subscriber that joins late first receives the most recent
//! intermediate result and progress. A subscriber that cancels receives its
//! cancellation immediately; the shared computation is cancelled only when
//! its last subscriber leaves. Lock order is always the in-flight map, then
//! one multiplexer's state.

use super::consumer::{Consumer, ConsumerGuard, Shareable, SharedConsumer, Status};
use super::context::ProducerContext;
use super::{Producer, SharedProducer};
use crate::artifact::{EncodedImage, ImageRef};
use crate::cache::{CacheKey, CacheKeyFactory};
use crate::error::PipelineError;
use crate::executor::ExecutorSupplier;
use crate::request::{Priority, RequestLevel};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const ENCODED_PRODUCER_NAME: &str = "EncodedCacheKeyMultiplexProducer";
pub const DECODED_PRODUCER_NAME: &str = "BitmapMemoryCacheKeyMultiplexProducer";

type MultiplexKey = (CacheKey, RequestLevel);
type InFlight<T> = Mutex<HashMap<MultiplexKey, Arc<Multiplexer<T>>>>;
type KeyFn = dyn Fn(&ProducerContext) -> CacheKey + Send + Sync;

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MultiplexStats {
    /// Total requests received
    pub total_requests: u64,
    /// Requests that joined an in-flight computation
    pub coalesced_requests: u64,
    /// Requests that started a new computation
    pub new_requests: u64,
}

impl MultiplexStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Shares one run of the input among all concurrent requests with the same
/// key and lowest permitted level.
pub struct MultiplexProducer<T> {
    name: &'static str,
    input: SharedProducer<T>,
    key_fn: Box<KeyFn>,
    in_flight: Arc<InFlight<T>>,
    executors: Arc<ExecutorSupplier>,
    stats: Mutex<MultiplexStats>,
}

impl MultiplexProducer<EncodedImage> {
    /// Coalesce by encoded cache key.
    pub fn encoded(
        input: SharedProducer<EncodedImage>,
        key_factory: Arc<dyn CacheKeyFactory>,
        executors: Arc<ExecutorSupplier>,
    ) -> Self {
        Self::new(ENCODED_PRODUCER_NAME, input, executors, move |context| {
            key_factory.encoded_key(context.request(), context.caller())
        })
    }
}

impl MultiplexProducer<ImageRef> {
    /// Coalesce by decoded cache key.
    pub fn decoded(
        input: SharedProducer<ImageRef>,
        key_factory: Arc<dyn CacheKeyFactory>,
        executors: Arc<ExecutorSupplier>,
    ) -> Self {
        Self::new(DECODED_PRODUCER_NAME, input, executors, move |context| {
            let request = context.request();
            key_factory.decoded_key(request, context.caller(), request.resize())
        })
    }
}

impl<T: Shareable + Send + Sync + 'static> MultiplexProducer<T> {
    pub fn new<F>(
        name: &'static str,
        input: SharedProducer<T>,
        executors: Arc<ExecutorSupplier>,
        key_fn: F,
    ) -> Self
    where
        F: Fn(&ProducerContext) -> CacheKey + Send + Sync + 'static,
    {
        Self {
            name,
            input,
            key_fn: Box::new(key_fn),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            executors,
            stats: Mutex::new(MultiplexStats::default()),
        }
    }

    pub fn stats(&self) -> MultiplexStats {
        *self.stats.lock()
    }

    /// Number of computations currently shared.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            producer = self.name,
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            in_flight = self.in_flight_count(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Request coalescing statistics"
        );
    }
}

impl<T: Shareable + Send + Sync + 'static> Producer<T> for MultiplexProducer<T> {
    fn produce_results(&self, consumer: SharedConsumer<T>, context: Arc<ProducerContext>) {
        context
            .listener()
            .on_producer_start(context.id(), self.name);
        let key = ((self.key_fn)(&context), context.lowest_permitted_level());

        let (multiplexer, subscription, created) = {
            let mut in_flight = self.in_flight.lock();
            let (multiplexer, created) = match in_flight.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let multiplexer = Arc::new(Multiplexer {
                        name: self.name,
                        key: key.clone(),
                        in_flight: Arc::downgrade(&self.in_flight),
                        shared_context: Arc::new(context.fork()),
                        done: CancellationToken::new(),
                        state: Mutex::new(MuxState::default()),
                    });
                    in_flight.insert(key.clone(), Arc::clone(&multiplexer));
                    (multiplexer, true)
                }
            };
            // Entries in the map are never closed while the map lock is held.
            let subscription = multiplexer.subscribe(consumer, Arc::clone(&context));
            (multiplexer, subscription, created)
        };

        {
            let mut stats = self.stats.lock();
            stats.total_requests += 1;
            if created {
                stats.new_requests += 1;
            } else {
                stats.coalesced_requests += 1;
            }
        }
        debug!(
            request_id = %context.id(),
            key = %key.0,
            coalesced = !created,
            "Multiplexing request"
        );

        subscription.replay();
        multiplexer.watch_cancellation(subscription.id, &context, &self.executors);

        if created {
            let consumer = Arc::new(MuxConsumer {
                multiplexer: Arc::clone(&multiplexer),
            });
            self.input
                .produce_results(consumer, Arc::clone(&multiplexer.shared_context));
        }
    }
}

/// One subscriber's consumer. Deliveries carry a sequence number so that a
/// replayed intermediate never overtakes a newer one.
struct Sink<T> {
    consumer: ConsumerGuard<T>,
    delivered: Mutex<u64>,
}

impl<T> Sink<T> {
    fn intermediate(&self, seq: u64, value: &T, status: Status) {
        let mut delivered = self.delivered.lock();
        if seq <= *delivered {
            return;
        }
        *delivered = seq;
        self.consumer.on_new_result(Some(value), status);
    }
}

struct Subscriber<T> {
    id: u64,
    sink: Arc<Sink<T>>,
    context: Arc<ProducerContext>,
}

struct MuxState<T> {
    subscribers: Vec<Subscriber<T>>,
    last_intermediate: Option<(T, Status, u64)>,
    last_progress: Option<f32>,
    seq: u64,
    next_subscriber: u64,
    closed: bool,
}

impl<T> Default for MuxState<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            last_intermediate: None,
            last_progress: None,
            seq: 0,
            next_subscriber: 0,
            closed: false,
        }
    }
}

/// What a new subscriber must be sent before live results.
struct Subscription<T> {
    id: u64,
    sink: Arc<Sink<T>>,
    intermediate: Option<(T, Status, u64)>,
    progress: Option<f32>,
}

impl<T> Subscription<T> {
    fn replay(&self) {
        if let Some(progress) = self.progress {
            self.sink.consumer.on_progress_update(progress);
        }
        if let Some((value, status, seq)) = &self.intermediate {
            self.sink.intermediate(*seq, value, *status);
        }
    }
}

enum Terminal<'a, T> {
    Result(Option<&'a T>, Status),
    Failure(PipelineError),
    Cancellation,
}

struct Multiplexer<T> {
    name: &'static str,
    key: MultiplexKey,
    in_flight: Weak<InFlight<T>>,
    shared_context: Arc<ProducerContext>,
    /// Cancelled once the multiplexer closes, releasing subscriber watchers.
    done: CancellationToken,
    state: Mutex<MuxState<T>>,
}

impl<T: Shareable + Send + Sync + 'static> Multiplexer<T> {
    /// Caller holds the in-flight map lock.
    fn subscribe(&self, consumer: SharedConsumer<T>, context: Arc<ProducerContext>) -> Subscription<T> {
        let sink = Arc::new(Sink {
            consumer: ConsumerGuard::new(consumer),
            delivered: Mutex::new(0),
        });
        let mut state = self.state.lock();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push(Subscriber {
            id,
            sink: Arc::clone(&sink),
            context,
        });
        self.update_shared_context(&state.subscribers);

        Subscription {
            id,
            sink,
            intermediate: state
                .last_intermediate
                .as_ref()
                .and_then(|(value, status, seq)| value.share().map(|v| (v, *status, *seq))),
            progress: state.last_progress,
        }
    }

    /// Highest priority wins; the shared work is a prefetch only if every
    /// subscriber is one.
    fn update_shared_context(&self, subscribers: &[Subscriber<T>]) {
        let priority = subscribers
            .iter()
            .map(|s| s.context.priority())
            .max()
            .unwrap_or(Priority::Low);
        let is_prefetch = subscribers.iter().all(|s| s.context.is_prefetch());
        self.shared_context.set_priority(priority);
        self.shared_context.set_is_prefetch(is_prefetch);
    }

    fn watch_cancellation(
        self: &Arc<Self>,
        subscriber: u64,
        context: &ProducerContext,
        executors: &ExecutorSupplier,
    ) {
        let multiplexer = Arc::clone(self);
        let cancelled = context.cancellation_token().clone();
        let done = self.done.clone();
        executors.for_light_work().runtime().spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => multiplexer.unsubscribe(subscriber),
                _ = done.cancelled() => {}
            }
        });
    }

    /// Remove this multiplexer from the in-flight map if it is still there.
    fn detach(&self, in_flight: &mut HashMap<MultiplexKey, Arc<Multiplexer<T>>>) {
        if in_flight
            .get(&self.key)
            .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), self))
        {
            in_flight.remove(&self.key);
        }
    }

    fn unsubscribe(&self, subscriber: u64) {
        let in_flight = self.in_flight.upgrade();
        let (removed, last) = {
            let mut map = in_flight.as_ref().map(|m| m.lock());
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let Some(index) = state.subscribers.iter().position(|s| s.id == subscriber) else {
                return;
            };
            let removed = state.subscribers.remove(index);
            let last = state.subscribers.is_empty();
            if last {
                state.closed = true;
                state.last_intermediate = None;
                if let Some(map) = map.as_deref_mut() {
                    self.detach(map);
                }
            } else {
                self.update_shared_context(&state.subscribers);
            }
            (removed, last)
        };

        removed
            .context
            .listener()
            .on_producer_finish_with_cancellation(removed.context.id(), self.name);
        removed.sink.consumer.on_cancellation();

        if last {
            debug!(key = %self.key.0, "Last subscriber left, cancelling shared request");
            self.done.cancel();
            self.shared_context.cancel();
        }
    }

    fn intermediate(&self, value: &T, status: Status) {
        let (seq, sinks) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.seq += 1;
            let seq = state.seq;
            state.last_intermediate = value.share().map(|v| (v, status, seq));
            (seq, self.sinks(&state))
        };
        for sink in sinks {
            sink.intermediate(seq, value, status);
        }
    }

    fn progress(&self, progress: f32) {
        let sinks = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.last_progress = Some(progress);
            self.sinks(&state)
        };
        for sink in sinks {
            sink.consumer.on_progress_update(progress);
        }
    }

    fn sinks(&self, state: &MuxState<T>) -> Vec<Arc<Sink<T>>> {
        state.subscribers.iter().map(|s| Arc::clone(&s.sink)).collect()
    }

    fn finish(&self, terminal: Terminal<'_, T>) {
        let in_flight = self.in_flight.upgrade();
        let subscribers = {
            let mut map = in_flight.as_ref().map(|m| m.lock());
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.last_intermediate = None;
            if let Some(map) = map.as_deref_mut() {
                self.detach(map);
            }
            std::mem::take(&mut state.subscribers)
        };
        self.done.cancel();

        for subscriber in subscribers {
            let id = subscriber.context.id();
            let listener = subscriber.context.listener();
            let consumer = &subscriber.sink.consumer;
            match &terminal {
                Terminal::Result(result, status) => {
                    listener.on_producer_finish_with_success(id, self.name, None);
                    consumer.on_new_result(*result, *status);
                }
                Terminal::Failure(error) => {
                    listener.on_producer_finish_with_failure(id, self.name, error);
                    consumer.on_failure(error.clone());
                }
                Terminal::Cancellation => {
                    listener.on_producer_finish_with_cancellation(id, self.name);
                    consumer.on_cancellation();
                }
            }
        }
    }
}

/// Consumer handed to the shared input.
struct MuxConsumer<T> {
    multiplexer: Arc<Multiplexer<T>>,
}

impl<T: Shareable + Send + Sync + 'static> Consumer<T> for MuxConsumer<T> {
    fn on_new_result(&self, result: Option<&T>, status: Status) {
        if status.is_last() {
            self.multiplexer.finish(Terminal::Result(result, status));
        } else if let Some(value) = result {
            self.multiplexer.intermediate(value, status);
        }
    }

    fn on_failure(&self, error: PipelineError) {
        self.multiplexer.finish(Terminal::Failure(error));
    }

    fn on_cancellation(&self) {
        self.multiplexer.finish(Terminal::Cancellation);
    }

    fn on_progress_update(&self, progress: f32) {
        self.multiplexer.progress(progress);
    }
}
