//! Async disk tier: a [`DiskStorage`] behind a staging area and the disk pool.

use super::disk::DiskStorage;
use super::key::CacheKey;
use super::r#trait::DiskCacheTier;
use super::staging::StagingArea;
use super::stats::TierStatsSnapshot;
use super::types::CacheError;
use crate::artifact::EncodedImage;
use crate::executor::WorkerPool;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Write generations: a write only lands if neither its key nor the whole
/// tier was invalidated after it was scheduled.
#[derive(Default)]
struct WriteGenerations {
    /// Bumped by `clear_all`
    epoch: AtomicU64,
    /// Bumped by `remove`, per key
    keys: DashMap<CacheKey, u64>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct WriteStamp {
    epoch: u64,
    key: u64,
}

impl WriteGenerations {
    fn stamp(&self, key: &CacheKey) -> WriteStamp {
        WriteStamp {
            epoch: self.epoch.load(Ordering::SeqCst),
            key: self.keys.get(key).map_or(0, |generation| *generation),
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        *self.keys.entry(key.clone()).or_insert(0) += 1;
    }

    fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// Disk tier whose blocking work runs on the disk I/O pool.
///
/// Writes are staged in memory first, so `get` sees them immediately, and
/// are flushed to disk in the background. A failed write is logged and
/// counted; it never reaches the request that triggered it. A write still
/// in flight when its key is removed (or the tier cleared) is dropped
/// instead of stored.
pub struct BufferedDiskCache {
    storage: Arc<DiskStorage>,
    staging: Arc<StagingArea>,
    generations: Arc<WriteGenerations>,
    pool: WorkerPool,
}

impl BufferedDiskCache {
    pub fn new(storage: DiskStorage, pool: WorkerPool) -> Self {
        Self {
            storage: Arc::new(storage),
            staging: Arc::new(StagingArea::new()),
            generations: Arc::new(WriteGenerations::default()),
            pool,
        }
    }

    pub fn storage(&self) -> &DiskStorage {
        &self.storage
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Look up `key`, staging area first.
    pub async fn get(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> Result<Option<EncodedImage>, CacheError> {
        if let Some(staged) = self.staging.get(key) {
            debug!(tier = self.storage.name(), key = %key, "Served from staging area");
            return Ok(Some(staged));
        }

        let storage = Arc::clone(&self.storage);
        let key = key.clone();
        let cancel = cancel.clone();
        let stored = self
            .pool
            .spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Err(CacheError::Cancelled);
                }
                storage.get(&key)
            })
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))???;

        Ok(stored.map(|entry| entry.into_encoded()))
    }

    /// Stage `image` and write it in the background.
    ///
    /// The returned handle completes once the write has finished or failed;
    /// callers are free to drop it. Returns `None` if `image` is closed.
    pub fn write(&self, key: CacheKey, image: &EncodedImage) -> Option<JoinHandle<()>> {
        let copy = image.try_clone().ok()?;
        let marker = image.try_clone().ok()?;
        let stamp = self.generations.stamp(&key);
        self.staging.put(key.clone(), &copy);

        let storage = Arc::clone(&self.storage);
        let staging = Arc::clone(&self.staging);
        let generations = Arc::clone(&self.generations);
        let write_key = key.clone();
        let job = self.pool.spawn_blocking(move || {
            let result = storage
                .insert_if(&write_key, &copy, || generations.stamp(&write_key) == stamp)
                .map(|_| ());
            staging.remove_if_same(&write_key, &copy);
            result
        });

        let name = self.storage.name();
        let staging = Arc::clone(&self.staging);
        Some(self.pool.runtime().spawn(async move {
            let failure = match job.await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.to_string()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(error) = failure {
                warn!(tier = name, key = %key, %error, "Disk cache write failed");
                staging.remove_if_same(&key, &marker);
            }
        }))
    }

    /// Whether the key is staged or indexed on disk.
    pub fn contains_sync(&self, key: &CacheKey) -> bool {
        self.staging.contains(key) || self.storage.contains(key)
    }

    /// Remove the entry, including any write still in flight for it.
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.generations.invalidate(key);
        self.staging.remove(key);
        let storage = Arc::clone(&self.storage);
        let key = key.clone();
        self.pool
            .spawn_blocking(move || storage.remove(&key).map(|_| ()))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??
    }

    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.generations.invalidate_all();
        self.staging.clear_all();
        let storage = Arc::clone(&self.storage);
        self.pool
            .spawn_blocking(move || storage.clear_all())
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??
    }
}

impl DiskCacheTier for BufferedDiskCache {
    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<EncodedImage>, CacheError>> {
        BufferedDiskCache::get(self, key, cancel).boxed()
    }

    fn put(&self, key: CacheKey, image: &EncodedImage) {
        if self.write(key, image).is_none() {
            debug!(tier = self.storage.name(), "Skipped disk write of released image");
        }
    }

    fn contains_sync(&self, key: &CacheKey) -> bool {
        BufferedDiskCache::contains_sync(self, key)
    }

    fn remove<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>> {
        BufferedDiskCache::remove(self, key).boxed()
    }

    fn clear_all(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        BufferedDiskCache::clear_all(self).boxed()
    }

    fn pending_writes(&self) -> usize {
        self.staging.len()
    }

    fn stats(&self) -> TierStatsSnapshot {
        self.storage.stats()
    }
}
