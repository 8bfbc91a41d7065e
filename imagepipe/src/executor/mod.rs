//! Worker pools partitioned by cost class.
//!
//! Pipeline work is split into four classes, each with its own bounded pool
//! so that slow work of one kind never starves another:
//!
//! - [`WorkClass::Network`]: fetching from remote sources
//! - [`WorkClass::DiskIo`]: blocking disk cache reads and writes
//! - [`WorkClass::Decode`]: CPU-bound decoding
//! - [`WorkClass::Light`]: cheap transforms and bookkeeping
//!
//! Stages submit to the matching pool and return immediately; results are
//! delivered from whichever pool produced them.

mod config;
mod resource_pool;
mod supplier;

pub use config::{
    ExecutorConfig, DEFAULT_DISK_IO_WORKERS, DEFAULT_NETWORK_WORKERS, MIN_CPU_WORKERS,
};
pub use resource_pool::{ExecutorError, WorkClass, WorkerPool};
pub use supplier::ExecutorSupplier;
