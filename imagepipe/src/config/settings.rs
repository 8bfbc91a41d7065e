//! Configuration structs.

use crate::cache::CacheConfig;
use crate::executor::ExecutorConfig;
use std::time::Duration;

/// Default minimum gap between progressive intermediate results.
pub const DEFAULT_PROGRESSIVE_THROTTLE_MS: u64 = 100;

/// Progressive JPEG delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressiveConfig {
    /// Master switch; requests must also opt in
    pub enabled: bool,
    /// Minimum time between partial results forwarded by the fetch stage
    pub throttle_ms: u64,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            throttle_ms: DEFAULT_PROGRESSIVE_THROTTLE_MS,
        }
    }
}

impl ProgressiveConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Everything needed to build an [`ImagePipeline`](crate::pipeline::ImagePipeline).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub executor: ExecutorConfig,
    pub progressive: ProgressiveConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_progressive(mut self, progressive: ProgressiveConfig) -> Self {
        self.progressive = progressive;
        self
    }
}
