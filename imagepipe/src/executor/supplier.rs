//! The set of worker pools shared by all pipeline stages.

use super::config::ExecutorConfig;
use super::resource_pool::{ExecutorError, WorkClass, WorkerPool};
use tokio::runtime::Handle;
use tracing::info;

/// One [`WorkerPool`] per [`WorkClass`].
#[derive(Debug, Clone)]
pub struct ExecutorSupplier {
    network: WorkerPool,
    disk_io: WorkerPool,
    decode: WorkerPool,
    light: WorkerPool,
}

impl ExecutorSupplier {
    /// Create pools spawning onto the given runtime.
    pub fn new(handle: Handle, config: &ExecutorConfig) -> Self {
        info!(
            network = config.network_workers,
            disk_io = config.disk_io_workers,
            decode = config.decode_workers,
            light = config.light_workers,
            "Creating worker pools"
        );
        Self {
            network: WorkerPool::new(WorkClass::Network, handle.clone(), config.network_workers),
            disk_io: WorkerPool::new(WorkClass::DiskIo, handle.clone(), config.disk_io_workers),
            decode: WorkerPool::new(WorkClass::Decode, handle.clone(), config.decode_workers),
            light: WorkerPool::new(WorkClass::Light, handle, config.light_workers),
        }
    }

    /// Create pools on the runtime the caller is running in.
    pub fn from_current(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let handle = Handle::try_current().map_err(|e| ExecutorError::NoRuntime(e.to_string()))?;
        Ok(Self::new(handle, config))
    }

    pub fn for_network(&self) -> &WorkerPool {
        &self.network
    }

    pub fn for_disk_io(&self) -> &WorkerPool {
        &self.disk_io
    }

    pub fn for_decode(&self) -> &WorkerPool {
        &self.decode
    }

    pub fn for_light_work(&self) -> &WorkerPool {
        &self.light
    }

    pub fn pool(&self, class: WorkClass) -> &WorkerPool {
        match class {
            WorkClass::Network => &self.network,
            WorkClass::DiskIo => &self.disk_io,
            WorkClass::Decode => &self.decode,
            WorkClass::Light => &self.light,
        }
    }

    /// Shut every pool down.
    pub fn shutdown(&self) {
        for pool in [&self.network, &self.disk_io, &self.decode, &self.light] {
            pool.shutdown();
        }
    }
}
