//! Worker pool sizing.

/// Default concurrent fetches.
pub const DEFAULT_NETWORK_WORKERS: usize = 3;

/// Default concurrent blocking disk operations.
pub const DEFAULT_DISK_IO_WORKERS: usize = 2;

/// Floor for the CPU-sized pools.
pub const MIN_CPU_WORKERS: usize = 2;

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Concurrency of each worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub network_workers: usize,
    pub disk_io_workers: usize,
    /// Default: number of CPUs
    pub decode_workers: usize,
    /// Default: number of CPUs
    pub light_workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let cpus = cpu_count().max(MIN_CPU_WORKERS);
        Self {
            network_workers: DEFAULT_NETWORK_WORKERS,
            disk_io_workers: DEFAULT_DISK_IO_WORKERS,
            decode_workers: cpus,
            light_workers: cpus,
        }
    }
}

impl ExecutorConfig {
    pub fn with_network_workers(mut self, workers: usize) -> Self {
        self.network_workers = workers;
        self
    }

    pub fn with_disk_io_workers(mut self, workers: usize) -> Self {
        self.disk_io_workers = workers;
        self
    }

    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers;
        self
    }

    pub fn with_light_workers(mut self, workers: usize) -> Self {
        self.light_workers = workers;
        self
    }
}
