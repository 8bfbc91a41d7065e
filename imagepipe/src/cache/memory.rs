//! In-memory cache with LRU eviction.
//!
//! Entries are stored as independently owned [`ResourceHandle`] copies, so a
//! caller closing its own handle never invalidates what the cache holds, and
//! eviction never invalidates a handle a caller still holds.
//!
//! A recency index maps each entry's last access tick to its key, so
//! eviction pops entries oldest first without scanning the table.

use super::key::CacheKey;
use super::stats::{TierStats, TierStatsSnapshot};
use super::types::MemorySize;
use crate::resource::ResourceHandle;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Entry in the memory cache.
struct CacheEntry<V: Send + Sync + 'static> {
    handle: ResourceHandle<V>,
    size: usize,
    /// Logical clock value of the last access, for LRU ordering
    last_accessed: u64,
    access_count: u64,
}

struct MemoryCacheInner<V: Send + Sync + 'static> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Last access tick to key; ticks are unique
    recency: BTreeMap<u64, CacheKey>,
    size_bytes: usize,
    clock: u64,
}

impl<V: Send + Sync + 'static> MemoryCacheInner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            size_bytes: 0,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Insert a key that is not present.
    fn insert(&mut self, key: CacheKey, handle: ResourceHandle<V>, size: usize) {
        let now = self.tick();
        self.recency.insert(now, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                handle,
                size,
                last_accessed: now,
                access_count: 0,
            },
        );
        self.size_bytes += size;
    }

    /// Mark `key` as just used. Returns its entry if present.
    fn touch(&mut self, key: &CacheKey) -> Option<&mut CacheEntry<V>> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_accessed);
        self.recency.insert(now, key.clone());
        entry.last_accessed = now;
        entry.access_count += 1;
        Some(entry)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_accessed);
        self.size_bytes -= entry.size;
        Some(entry)
    }

    fn pop_least_recent(&mut self) -> Option<(CacheKey, CacheEntry<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.size_bytes -= entry.size;
        Some((key, entry))
    }

    fn clear(&mut self) -> Vec<CacheEntry<V>> {
        self.recency.clear();
        self.size_bytes = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

/// Byte- and count-bounded LRU cache of shared values.
///
/// `put` on a key that is already present replaces the stored value (last
/// writer wins).
pub struct MemoryCache<V: MemorySize + Send + Sync + 'static> {
    name: &'static str,
    inner: Mutex<MemoryCacheInner<V>>,
    max_size_bytes: usize,
    max_entries: usize,
    stats: TierStats,
}

impl<V: MemorySize + Send + Sync + 'static> MemoryCache<V> {
    /// Create a memory cache.
    ///
    /// # Arguments
    ///
    /// * `name` - Tier name used in logs
    /// * `max_size_bytes` - Total size budget
    /// * `max_entries` - Entry count budget
    pub fn new(name: &'static str, max_size_bytes: usize, max_entries: usize) -> Self {
        Self {
            name,
            inner: Mutex::new(MemoryCacheInner::new()),
            max_size_bytes,
            max_entries,
            stats: TierStats::new(),
        }
    }

    /// Look up a value, returning a new handle to it on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<ResourceHandle<V>> {
        let mut inner = self.inner.lock();
        match inner.touch(key) {
            Some(entry) => {
                self.stats.record_hit();
                entry.handle.acquire()
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Store a copy of `value` under `key`.
    ///
    /// Returns a handle to the cached value, or `None` when the value is
    /// closed or larger than the whole budget and was not cached.
    pub fn put(&self, key: CacheKey, value: &ResourceHandle<V>) -> Option<ResourceHandle<V>> {
        let stored = value.acquire()?;
        let size = stored.get()?.size_in_bytes();
        if size > self.max_size_bytes || self.max_entries == 0 {
            debug!(tier = self.name, size, "Value exceeds memory budget, not caching");
            return None;
        }

        let mut evicted = Vec::new();
        let result = {
            let mut inner = self.inner.lock();
            evicted.extend(inner.remove(&key));

            let evicted_for_space = self.evict_for(&mut inner, size);
            self.stats.record_evictions(evicted_for_space.len() as u64);
            evicted.extend(evicted_for_space);

            let result = stored.acquire();
            inner.insert(key, stored, size);
            self.stats.record_write();
            self.stats
                .update_size(inner.size_bytes as u64, inner.entries.len());
            result
        };

        // Release superseded and evicted values outside the lock.
        drop(evicted);
        result
    }

    /// Remove least recently used entries until `incoming` more bytes fit.
    fn evict_for(&self, inner: &mut MemoryCacheInner<V>, incoming: usize) -> Vec<CacheEntry<V>> {
        let mut evicted = Vec::new();
        while !inner.entries.is_empty()
            && (inner.size_bytes + incoming > self.max_size_bytes
                || inner.entries.len() + 1 > self.max_entries)
        {
            let Some((oldest, entry)) = inner.pop_least_recent() else {
                break;
            };
            trace!(
                tier = self.name,
                key = %oldest,
                accesses = entry.access_count,
                "Evicting memory cache entry"
            );
            evicted.push(entry);
        }
        evicted
    }

    /// Whether `key` is cached. Does not count as an access.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Remove one entry. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.remove(key);
            if removed.is_some() {
                self.stats
                    .update_size(inner.size_bytes as u64, inner.entries.len());
            }
            removed
        };
        removed.is_some()
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub fn remove_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let removed: Vec<CacheEntry<V>> = {
            let mut inner = self.inner.lock();
            let keys: Vec<CacheKey> = inner
                .entries
                .keys()
                .filter(|key| predicate(key))
                .cloned()
                .collect();
            let removed: Vec<_> = keys.iter().filter_map(|key| inner.remove(key)).collect();
            self.stats
                .update_size(inner.size_bytes as u64, inner.entries.len());
            removed
        };
        removed.len()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let drained: Vec<CacheEntry<V>> = {
            let mut inner = self.inner.lock();
            self.stats.update_size(0, 0);
            inner.clear()
        };
        debug!(tier = self.name, entries = drained.len(), "Memory cache cleared");
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn stats(&self) -> TierStatsSnapshot {
        self.stats.snapshot()
    }
}
