//! Per-tier cache statistics.

use crate::config::format_size;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    evictions: AtomicU64,
    size_bytes: AtomicU64,
    entry_count: AtomicU64,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn update_size(&self, size_bytes: u64, entry_count: usize) {
        self.size_bytes.store(size_bytes, Ordering::Relaxed);
        self.entry_count.store(entry_count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierStatsSnapshot {
        TierStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size_bytes: self.size_bytes.load(Ordering::Relaxed),
            entry_count: self.entry_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TierStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub evictions: u64,
    pub size_bytes: u64,
    pub entry_count: u64,
}

impl TierStatsSnapshot {
    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Statistics of every tier in a [`CacheSystem`](super::CacheSystem).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheSystemStats {
    pub bitmap_memory: TierStatsSnapshot,
    pub encoded_memory: TierStatsSnapshot,
    pub disk_default: TierStatsSnapshot,
    pub disk_small: TierStatsSnapshot,
}

impl CacheSystemStats {
    /// Human-readable multi-line report.
    pub fn format(&self) -> String {
        let mut out = String::from("Image Pipeline Cache Statistics\n");
        for (name, tier) in [
            ("BITMAP MEMORY", &self.bitmap_memory),
            ("ENCODED MEMORY", &self.encoded_memory),
            ("DISK (default)", &self.disk_default),
            ("DISK (small)", &self.disk_small),
        ] {
            out.push_str(&format!(
                "\n{name}\n  Entries:     {}\n  Size:        {}\n  Hits:        {}\n  Misses:      {}\n  Hit Rate:    {:.1}%\n  Writes:      {}\n  Evictions:   {}\n",
                tier.entry_count,
                format_size(tier.size_bytes),
                tier.hits,
                tier.misses,
                tier.hit_rate() * 100.0,
                tier.writes,
                tier.evictions,
            ));
        }
        out
    }
}
