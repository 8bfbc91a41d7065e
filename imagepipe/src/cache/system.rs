//! The full set of cache tiers used by one pipeline.

use super::buffered::BufferedDiskCache;
use super::config::CacheConfig;
use super::disk::DiskStorage;
use super::key::CacheKey;
use super::memory::MemoryCache;
use super::r#trait::DiskCacheTier;
use super::stats::CacheSystemStats;
use super::types::CacheError;
use crate::artifact::DecodedImage;
use crate::config::format_size;
use crate::executor::ExecutorSupplier;
use crate::request::CacheChoice;
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

/// Decoded memory, encoded memory, and the two disk partitions.
pub struct CacheSystem {
    bitmap: Arc<MemoryCache<DecodedImage>>,
    encoded: Arc<MemoryCache<Bytes>>,
    disk_default: Arc<dyn DiskCacheTier>,
    disk_small: Arc<dyn DiskCacheTier>,
}

impl CacheSystem {
    /// Open every tier described by `config`, running disk work on the disk
    /// I/O pool.
    pub fn new(config: &CacheConfig, executors: &ExecutorSupplier) -> Result<Self, CacheError> {
        let default_storage =
            DiskStorage::new("disk-default", config.default_partition_dir(), config.disk_size)?;
        let small_storage =
            DiskStorage::new("disk-small", config.small_partition_dir(), config.small_disk_size)?;

        info!(
            directory = %config.directory.display(),
            bitmap_memory = %format_size(config.bitmap_memory_size as u64),
            encoded_memory = %format_size(config.encoded_memory_size as u64),
            disk = %format_size(config.disk_size),
            small_disk = %format_size(config.small_disk_size),
            "Cache system initialized"
        );

        Ok(Self::from_parts(
            Arc::new(MemoryCache::new(
                "bitmap-memory",
                config.bitmap_memory_size,
                config.bitmap_max_entries,
            )),
            Arc::new(MemoryCache::new(
                "encoded-memory",
                config.encoded_memory_size,
                config.encoded_max_entries,
            )),
            Arc::new(BufferedDiskCache::new(
                default_storage,
                executors.for_disk_io().clone(),
            )),
            Arc::new(BufferedDiskCache::new(
                small_storage,
                executors.for_disk_io().clone(),
            )),
        ))
    }

    /// Assemble a cache system from existing tiers.
    pub fn from_parts(
        bitmap: Arc<MemoryCache<DecodedImage>>,
        encoded: Arc<MemoryCache<Bytes>>,
        disk_default: Arc<dyn DiskCacheTier>,
        disk_small: Arc<dyn DiskCacheTier>,
    ) -> Self {
        Self {
            bitmap,
            encoded,
            disk_default,
            disk_small,
        }
    }

    pub fn bitmap_cache(&self) -> &Arc<MemoryCache<DecodedImage>> {
        &self.bitmap
    }

    pub fn encoded_cache(&self) -> &Arc<MemoryCache<Bytes>> {
        &self.encoded
    }

    pub fn default_disk(&self) -> &Arc<dyn DiskCacheTier> {
        &self.disk_default
    }

    pub fn small_disk(&self) -> &Arc<dyn DiskCacheTier> {
        &self.disk_small
    }

    /// The disk partition selected by a request's cache choice.
    pub fn disk_for(&self, choice: CacheChoice) -> &Arc<dyn DiskCacheTier> {
        match choice {
            CacheChoice::Default => &self.disk_default,
            CacheChoice::Small => &self.disk_small,
        }
    }

    /// Drop every memory entry derived from `uri`. Returns the number removed.
    pub fn evict_from_memory(&self, uri: &str) -> usize {
        self.bitmap.remove_matching(|key| key.contains_uri(uri))
            + self.encoded.remove_matching(|key| key.contains_uri(uri))
    }

    /// Remove an encoded key from both disk partitions.
    pub async fn evict_from_disk(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.disk_default.remove(key).await?;
        self.disk_small.remove(key).await
    }

    pub fn clear_memory(&self) {
        self.bitmap.clear();
        self.encoded.clear();
    }

    pub async fn clear_disk(&self) -> Result<(), CacheError> {
        self.disk_default.clear_all().await?;
        self.disk_small.clear_all().await
    }

    /// Writes still staged in either disk partition.
    pub fn pending_disk_writes(&self) -> usize {
        self.disk_default.pending_writes() + self.disk_small.pending_writes()
    }

    pub fn stats(&self) -> CacheSystemStats {
        CacheSystemStats {
            bitmap_memory: self.bitmap.stats(),
            encoded_memory: self.encoded.stats(),
            disk_default: self.disk_default.stats(),
            disk_small: self.disk_small.stats(),
        }
    }

    /// Log a one-line summary of every tier.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            bitmap_entries = stats.bitmap_memory.entry_count,
            bitmap_hit_rate = format!("{:.1}%", stats.bitmap_memory.hit_rate() * 100.0),
            encoded_entries = stats.encoded_memory.entry_count,
            encoded_hit_rate = format!("{:.1}%", stats.encoded_memory.hit_rate() * 100.0),
            disk_default_size = %format_size(stats.disk_default.size_bytes),
            disk_small_size = %format_size(stats.disk_small.size_bytes),
            "Cache statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{EncodedImage, ImageFormat};
    use crate::executor::ExecutorConfig;
    use crate::resource::ResourceHandle;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn system(dir: &TempDir) -> CacheSystem {
        let config = CacheConfig::default().with_directory(dir.path().to_path_buf());
        let executors = ExecutorSupplier::from_current(&ExecutorConfig::default()).unwrap();
        CacheSystem::new(&config, &executors).unwrap()
    }

    #[tokio::test]
    async fn test_partitions_are_separate_directories() {
        let dir = TempDir::new().unwrap();
        let system = system(&dir);
        let key = CacheKey::simple("https://x.test/a.png");

        system
            .disk_for(CacheChoice::Small)
            .put(key.clone(), &EncodedImage::from_bytes(vec![1u8; 8]));

        assert!(system.small_disk().contains_sync(&key));
        assert!(!system.default_disk().contains_sync(&key));
        assert!(dir.path().join("small").is_dir());
        assert!(dir.path().join("default").is_dir());
    }

    #[tokio::test]
    async fn test_evict_from_memory_by_uri() {
        let dir = TempDir::new().unwrap();
        let system = system(&dir);
        let uri = "https://x.test/a.png";

        system.encoded_cache().put(
            CacheKey::simple(uri),
            &ResourceHandle::new(Bytes::from_static(b"abc")),
        );
        system.bitmap_cache().put(
            CacheKey::simple(format!("{uri}#decoded")),
            &ResourceHandle::new(DecodedImage::new(image::RgbaImage::new(1, 1), ImageFormat::Png)),
        );
        system
            .encoded_cache()
            .put(CacheKey::simple("other"), &ResourceHandle::new(Bytes::from_static(b"x")));

        assert_eq!(system.evict_from_memory(uri), 2);
        assert_eq!(system.encoded_cache().entry_count(), 1);
    }

    #[tokio::test]
    async fn test_evict_from_disk_and_clear() {
        let dir = TempDir::new().unwrap();
        let pool = ExecutorSupplier::from_current(&ExecutorConfig::default())
            .unwrap()
            .for_disk_io()
            .clone();
        let open = |name: &'static str| {
            let storage = DiskStorage::new(name, dir.path().join(name), 1 << 20).unwrap();
            Arc::new(BufferedDiskCache::new(storage, pool.clone()))
        };
        let default = open("default");
        let small = open("small");
        let system = CacheSystem::from_parts(
            Arc::new(MemoryCache::new("bitmap", 1 << 20, 8)),
            Arc::new(MemoryCache::new("encoded", 1 << 20, 8)),
            default.clone(),
            small.clone(),
        );

        let key = CacheKey::simple("k");
        default
            .write(key.clone(), &EncodedImage::from_bytes(vec![1u8; 4]))
            .unwrap()
            .await
            .unwrap();
        small
            .write(key.clone(), &EncodedImage::from_bytes(vec![2u8; 4]))
            .unwrap()
            .await
            .unwrap();

        system.evict_from_disk(&key).await.unwrap();
        let token = CancellationToken::new();
        assert!(system.default_disk().get(&key, &token).await.unwrap().is_none());
        assert!(system.small_disk().get(&key, &token).await.unwrap().is_none());

        system.clear_memory();
        system.clear_disk().await.unwrap();
        assert_eq!(system.stats().bitmap_memory.entry_count, 0);
    }
}
