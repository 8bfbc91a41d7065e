//! No-operation listener.

use super::ProducerListener;

/// A listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProducerListener;

impl ProducerListener for NoOpProducerListener {}
