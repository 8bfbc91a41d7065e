//! Disk tier abstraction used by the pipeline stages.

use super::key::CacheKey;
use super::stats::TierStatsSnapshot;
use super::types::CacheError;
use crate::artifact::EncodedImage;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// An encoded-image disk tier.
///
/// Stages hold tiers as `Arc<dyn DiskCacheTier>` and never assume a
/// particular implementation or key factory.
pub trait DiskCacheTier: Send + Sync {
    /// Look up an entry off the calling thread.
    ///
    /// Resolves to `Err(CacheError::Cancelled)` if `cancel` fires before the
    /// disk is touched.
    fn get<'a>(
        &'a self,
        key: &'a CacheKey,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<EncodedImage>, CacheError>>;

    /// Schedule a write. Returns without waiting for the disk.
    fn put(&self, key: CacheKey, image: &EncodedImage);

    /// Cheap check against pending writes and the in-memory index.
    fn contains_sync(&self, key: &CacheKey) -> bool;

    /// Remove the entry, including any pending write.
    fn remove<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Remove every entry.
    fn clear_all(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Writes scheduled but not yet on disk.
    fn pending_writes(&self) -> usize {
        0
    }

    /// Tier statistics.
    fn stats(&self) -> TierStatsSnapshot {
        TierStatsSnapshot::default()
    }
}
