//! Tiered cache store.
//!
//! - [`MemoryCache`]: LRU memory tier, used for both decoded images and
//!   encoded bytes
//! - [`DiskStorage`]: blocking, size-bounded on-disk store
//! - [`BufferedDiskCache`]: async [`DiskCacheTier`] over a `DiskStorage`, with
//!   a staging area for pending writes
//! - [`CacheSystem`]: every tier of one pipeline, with the default and small
//!   disk partitions
//!
//! All tiers are keyed by [`CacheKey`] and never assume a particular
//! [`CacheKeyFactory`].

mod buffered;
mod config;
mod disk;
mod key;
mod key_factory;
mod memory;
mod staging;
mod stats;
mod system;
mod r#trait;
mod types;

pub use buffered::BufferedDiskCache;
pub use config::{
    default_cache_directory, CacheConfig, DEFAULT_BITMAP_MEMORY_SIZE, DEFAULT_DISK_SIZE,
    DEFAULT_ENCODED_MEMORY_SIZE, DEFAULT_MEMORY_MAX_ENTRIES, DEFAULT_SMALL_DISK_SIZE,
};
pub use disk::{DiskStorage, StoredEntry};
pub use key::{CacheKey, DecodedCacheKey, MultiCacheKey, SimpleCacheKey};
pub use key_factory::{CacheKeyFactory, DefaultCacheKeyFactory};
pub use memory::MemoryCache;
pub use r#trait::DiskCacheTier;
pub use staging::StagingArea;
pub use stats::{CacheSystemStats, TierStats, TierStatsSnapshot};
pub use system::CacheSystem;
pub use types::{CacheError, MemorySize};
