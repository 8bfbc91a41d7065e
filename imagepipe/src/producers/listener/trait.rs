//! Producer listener trait.

use crate::error::PipelineError;
use crate::producers::context::RequestId;
use std::collections::HashMap;

/// Extra key/value details a stage attaches to its finish event.
pub type ExtraMap = HashMap<&'static str, String>;

/// Receives lifecycle events from every stage of a request.
///
/// Every method has an empty default so implementations override only what
/// they need. Calls may arrive on any worker pool.
pub trait ProducerListener: Send + Sync {
    /// A stage started working on the request.
    fn on_producer_start(&self, _request_id: RequestId, _producer: &'static str) {}

    /// A stage-specific event, such as an intermediate result.
    fn on_producer_event(&self, _request_id: RequestId, _producer: &'static str, _event: &str) {}

    fn on_producer_finish_with_success(
        &self,
        _request_id: RequestId,
        _producer: &'static str,
        _extra: Option<&ExtraMap>,
    ) {
    }

    fn on_producer_finish_with_failure(
        &self,
        _request_id: RequestId,
        _producer: &'static str,
        _error: &PipelineError,
    ) {
    }

    fn on_producer_finish_with_cancellation(&self, _request_id: RequestId, _producer: &'static str) {}

    /// The stage that actually supplied the result was reached. `successful`
    /// is false when it had nothing to give.
    fn on_ultimate_producer_reached(
        &self,
        _request_id: RequestId,
        _producer: &'static str,
        _successful: bool,
    ) {
    }

    /// Whether stages should build an [`ExtraMap`] for this request.
    fn requires_extra_map(&self, _request_id: RequestId) -> bool {
        false
    }
}
