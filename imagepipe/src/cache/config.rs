//! Cache tier sizing and location.

use std::path::PathBuf;

/// Default decoded memory cache budget (256 MB).
pub const DEFAULT_BITMAP_MEMORY_SIZE: usize = 256 * 1024 * 1024;

/// Default encoded memory cache budget (64 MB).
pub const DEFAULT_ENCODED_MEMORY_SIZE: usize = 64 * 1024 * 1024;

/// Default entry limit for each memory cache.
pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 256;

/// Default budget of the default disk partition (512 MB).
pub const DEFAULT_DISK_SIZE: u64 = 512 * 1024 * 1024;

/// Default budget of the small-image disk partition (64 MB).
pub const DEFAULT_SMALL_DISK_SIZE: u64 = 64 * 1024 * 1024;

/// Subdirectory of the cache directory for the default partition.
pub const DEFAULT_PARTITION_DIR: &str = "default";

/// Subdirectory of the cache directory for the small-image partition.
pub const SMALL_PARTITION_DIR: &str = "small";

/// Default cache directory (`<platform cache dir>/imagepipe`).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imagepipe")
}

/// Sizing of every cache tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub bitmap_memory_size: usize,
    pub bitmap_max_entries: usize,
    pub encoded_memory_size: usize,
    pub encoded_max_entries: usize,
    /// Root directory; partitions live in subdirectories
    pub directory: PathBuf,
    pub disk_size: u64,
    pub small_disk_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bitmap_memory_size: DEFAULT_BITMAP_MEMORY_SIZE,
            bitmap_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            encoded_memory_size: DEFAULT_ENCODED_MEMORY_SIZE,
            encoded_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            directory: default_cache_directory(),
            disk_size: DEFAULT_DISK_SIZE,
            small_disk_size: DEFAULT_SMALL_DISK_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_bitmap_memory_size(mut self, size: usize) -> Self {
        self.bitmap_memory_size = size;
        self
    }

    pub fn with_encoded_memory_size(mut self, size: usize) -> Self {
        self.encoded_memory_size = size;
        self
    }

    pub fn with_disk_size(mut self, size: u64) -> Self {
        self.disk_size = size;
        self
    }

    pub fn with_small_disk_size(mut self, size: u64) -> Self {
        self.small_disk_size = size;
        self
    }

    pub fn default_partition_dir(&self) -> PathBuf {
        self.directory.join(DEFAULT_PARTITION_DIR)
    }

    pub fn small_partition_dir(&self) -> PathBuf {
        self.directory.join(SMALL_PARTITION_DIR)
    }
}
