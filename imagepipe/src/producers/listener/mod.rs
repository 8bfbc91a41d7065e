//! Instrumentation hooks for producer stages.
//!
//! Stages report their lifecycle to a [`ProducerListener`] carried by the
//! request's context. The listener decouples stages from any particular
//! observability backend:
//!
//! - [`TracingProducerListener`]: emits `tracing` events
//! - [`NoOpProducerListener`]: discards everything
//! - [`ForwardingProducerListener`]: fans out to several listeners

mod forwarding;
mod noop;
mod r#trait;
mod tracing_adapter;

pub use forwarding::ForwardingProducerListener;
pub use noop::NoOpProducerListener;
pub use r#trait::{ExtraMap, ProducerListener};
pub use tracing_adapter::TracingProducerListener;
