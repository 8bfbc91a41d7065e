//! Reference-counted ownership of shared buffers.
//!
//! Every cached or in-flight artifact in the pipeline is held through a
//! [`ResourceHandle`]. Handles are cheap to copy (an atomic count bump) and
//! the wrapped value is released exactly once, when the last open handle is
//! closed or dropped.

mod handle;

pub use handle::{ResourceError, ResourceHandle, ResourceReleaser};
