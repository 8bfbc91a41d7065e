//! `tracing` adapter.

use super::{ExtraMap, ProducerListener};
use crate::error::PipelineError;
use crate::producers::context::RequestId;
use tracing::{debug, trace, warn};

/// Listener that reports stage lifecycle as `tracing` events.
///
/// Starts and custom events are `trace`, finishes `debug`, failures `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProducerListener;

impl TracingProducerListener {
    pub fn new() -> Self {
        Self
    }
}

impl ProducerListener for TracingProducerListener {
    fn on_producer_start(&self, request_id: RequestId, producer: &'static str) {
        trace!(request_id = %request_id, producer, "Producer started");
    }

    fn on_producer_event(&self, request_id: RequestId, producer: &'static str, event: &str) {
        trace!(request_id = %request_id, producer, event, "Producer event");
    }

    fn on_producer_finish_with_success(
        &self,
        request_id: RequestId,
        producer: &'static str,
        extra: Option<&ExtraMap>,
    ) {
        debug!(request_id = %request_id, producer, extra = ?extra, "Producer finished");
    }

    fn on_producer_finish_with_failure(
        &self,
        request_id: RequestId,
        producer: &'static str,
        error: &PipelineError,
    ) {
        warn!(request_id = %request_id, producer, error = %error, "Producer failed");
    }

    fn on_producer_finish_with_cancellation(&self, request_id: RequestId, producer: &'static str) {
        debug!(request_id = %request_id, producer, "Producer cancelled");
    }

    fn on_ultimate_producer_reached(
        &self,
        request_id: RequestId,
        producer: &'static str,
        successful: bool,
    ) {
        debug!(request_id = %request_id, producer, successful, "Ultimate producer reached");
    }

    fn requires_extra_map(&self, _request_id: RequestId) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }
}
