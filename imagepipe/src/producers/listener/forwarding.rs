//! Fan-out listener.

use super::{ExtraMap, ProducerListener};
use crate::error::PipelineError;
use crate::producers::context::RequestId;
use std::sync::Arc;

/// Forwards every event to each wrapped listener in order.
#[derive(Clone, Default)]
pub struct ForwardingProducerListener {
    listeners: Vec<Arc<dyn ProducerListener>>,
}

impl ForwardingProducerListener {
    pub fn new(listeners: Vec<Arc<dyn ProducerListener>>) -> Self {
        Self { listeners }
    }

    pub fn push(&mut self, listener: Arc<dyn ProducerListener>) {
        self.listeners.push(listener);
    }
}

impl ProducerListener for ForwardingProducerListener {
    fn on_producer_start(&self, request_id: RequestId, producer: &'static str) {
        for l in &self.listeners {
            l.on_producer_start(request_id, producer);
        }
    }

    fn on_producer_event(&self, request_id: RequestId, producer: &'static str, event: &str) {
        for l in &self.listeners {
            l.on_producer_event(request_id, producer, event);
        }
    }

    fn on_producer_finish_with_success(
        &self,
        request_id: RequestId,
        producer: &'static str,
        extra: Option<&ExtraMap>,
    ) {
        for l in &self.listeners {
            l.on_producer_finish_with_success(request_id, producer, extra);
        }
    }

    fn on_producer_finish_with_failure(
        &self,
        request_id: RequestId,
        producer: &'static str,
        error: &PipelineError,
    ) {
        for l in &self.listeners {
            l.on_producer_finish_with_failure(request_id, producer, error);
        }
    }

    fn on_producer_finish_with_cancellation(&self, request_id: RequestId, producer: &'static str) {
        for l in &self.listeners {
            l.on_producer_finish_with_cancellation(request_id, producer);
        }
    }

    fn on_ultimate_producer_reached(
        &self,
        request_id: RequestId,
        producer: &'static str,
        successful: bool,
    ) {
        for l in &self.listeners {
            l.on_ultimate_producer_reached(request_id, producer, successful);
        }
    }

    fn requires_extra_map(&self, request_id: RequestId) -> bool {
        self.listeners.iter().any(|l| l.requires_extra_map(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
    }

    impl ProducerListener for Counting {
        fn on_producer_start(&self, _request_id: RequestId, _producer: &'static str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn requires_extra_map(&self, _request_id: RequestId) -> bool {
            true
        }
    }

    #[test]
    fn test_forwards_to_all() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let listener = ForwardingProducerListener::new(vec![a.clone(), b.clone()]);
        let id = RequestId::next();

        listener.on_producer_start(id, "test");

        assert_eq!(a.starts.load(Ordering::SeqCst), 1);
        assert_eq!(b.starts.load(Ordering::SeqCst), 1);
        assert!(listener.requires_extra_map(id));
        assert!(!ForwardingProducerListener::default().requires_extra_map(id));
    }
}
