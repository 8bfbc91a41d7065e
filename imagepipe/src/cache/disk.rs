//! Blocking disk storage for encoded images.
//!
//! One file per entry at `<root>/<id[0..2]>/<id>.cnt`, where `id` is a
//! resource id of the entry's [`CacheKey`]. Each file carries a small header
//! so the encoded artifact can be rebuilt without re-parsing the payload.
//!
//! ```text
//! magic "IPC1" | name_len u8 | format name | width u32 | height u32
//!              | rotation u16 | payload_len u64 | payload
//! ```
//!
//! All methods block; async callers go through
//! [`BufferedDiskCache`](super::BufferedDiskCache).

use super::key::CacheKey;
use super::stats::{TierStats, TierStatsSnapshot};
use super::types::CacheError;
use crate::artifact::{EncodedImage, ImageFormat};
use crate::resource::ResourceHandle;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const ENTRY_MAGIC: &[u8; 4] = b"IPC1";
const ENTRY_EXTENSION: &str = "cnt";
const FIXED_HEADER_LEN: usize = 4 + 1 + 4 + 4 + 2 + 8;

/// An entry read back from disk.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub bytes: Bytes,
    pub format: ImageFormat,
    pub dimensions: Option<(u32, u32)>,
    pub rotation_angle: u16,
}

impl StoredEntry {
    /// Rebuild an encoded artifact owning the stored bytes.
    pub fn into_encoded(self) -> EncodedImage {
        let mut image = EncodedImage::from_parts(
            ResourceHandle::new(self.bytes),
            self.format,
            self.dimensions,
            self.rotation_angle,
        );
        if self.format == ImageFormat::Unknown {
            image.parse_metadata();
        }
        image
    }
}

struct IndexEntry {
    path: PathBuf,
    size: u64,
    /// Nanoseconds since the epoch, strictly increasing across accesses
    last_access: u64,
}

#[derive(Default)]
struct DiskIndex {
    entries: HashMap<String, IndexEntry>,
    size_bytes: u64,
    clock: u64,
}

fn nanos_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

impl DiskIndex {
    /// Access stamp that orders strictly after every earlier one.
    fn next_stamp(&mut self) -> u64 {
        self.clock = nanos_since_epoch(SystemTime::now()).max(self.clock + 1);
        self.clock
    }

    fn insert(&mut self, id: String, entry: IndexEntry) {
        self.size_bytes += entry.size;
        if let Some(previous) = self.entries.insert(id, entry) {
            self.size_bytes -= previous.size;
        }
    }

    fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(id);
        if let Some(entry) = &removed {
            self.size_bytes -= entry.size;
        }
        removed
    }
}

/// Size-bounded disk store of encoded images.
///
/// Writing a key that already exists replaces the stored entry (last writer
/// wins). Writes go to a temporary file that is renamed into place, so a
/// concurrent reader sees either the old or the new entry.
pub struct DiskStorage {
    name: &'static str,
    root: PathBuf,
    max_size_bytes: u64,
    index: Mutex<DiskIndex>,
    temp_counter: AtomicU64,
    stats: TierStats,
}

impl DiskStorage {
    /// Open (or create) a store rooted at `root`.
    ///
    /// Existing entries are indexed and the store is trimmed to its budget.
    pub fn new(name: &'static str, root: PathBuf, max_size_bytes: u64) -> Result<Self, CacheError> {
        if max_size_bytes == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "disk tier '{name}' needs a non-zero size"
            )));
        }
        fs::create_dir_all(&root)?;

        let storage = Self {
            name,
            root,
            max_size_bytes,
            index: Mutex::new(DiskIndex::default()),
            temp_counter: AtomicU64::new(0),
            stats: TierStats::new(),
        };
        storage.scan()?;
        storage.evict_if_over_limit()?;
        Ok(storage)
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        let shard = id.get(..2).unwrap_or("00");
        self.root.join(shard).join(format!("{id}.{ENTRY_EXTENSION}"))
    }

    /// Read the entry for any of the key's resource ids.
    pub fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        for id in key.resource_ids() {
            let Some(path) = self.index.lock().entries.get(&id).map(|e| e.path.clone()) else {
                continue;
            };

            match fs::read(&path) {
                Ok(data) => match decode_entry(&path, data) {
                    Ok(entry) => {
                        let mut index = self.index.lock();
                        let stamp = index.next_stamp();
                        if let Some(indexed) = index.entries.get_mut(&id) {
                            indexed.last_access = stamp;
                        }
                        self.stats.record_hit();
                        return Ok(Some(entry));
                    }
                    Err(e) => {
                        warn!(tier = self.name, error = %e, "Dropping corrupt disk cache entry");
                        self.drop_entry(&id, &path);
                    }
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(tier = self.name, path = %path.display(), "Indexed file vanished");
                    self.drop_entry(&id, &path);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.stats.record_miss();
        Ok(None)
    }

    /// Store an encoded image under the key's primary resource id.
    pub fn insert(&self, key: &CacheKey, image: &EncodedImage) -> Result<(), CacheError> {
        self.insert_if(key, image, || true).map(|_| ())
    }

    /// Store an encoded image unless `still_wanted` says otherwise.
    ///
    /// `still_wanted` runs under the index lock, right before the entry is
    /// moved into place. A `remove` or `clear_all` that completes after it
    /// returned `true` therefore sees the new entry. Returns whether the
    /// entry was stored.
    pub fn insert_if(
        &self,
        key: &CacheKey,
        image: &EncodedImage,
        still_wanted: impl FnOnce() -> bool,
    ) -> Result<bool, CacheError> {
        let result = self.write_entry(key, image, still_wanted);
        match &result {
            Ok(true) => self.stats.record_write(),
            Ok(false) => {}
            Err(_) => self.stats.record_write_failure(),
        }
        if result? {
            self.evict_if_over_limit()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn write_entry(
        &self,
        key: &CacheKey,
        image: &EncodedImage,
        still_wanted: impl FnOnce() -> bool,
    ) -> Result<bool, CacheError> {
        let id = key
            .primary_resource_id()
            .ok_or_else(|| CacheError::InvalidConfig("empty cache key".to_string()))?;
        let payload = image.bytes().ok_or(CacheError::Released)?;
        let encoded = encode_entry(image, payload);

        let path = self.entry_path(&id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension(format!(
            "tmp{}",
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, &encoded)?;

        let mut index = self.index.lock();
        if !still_wanted() {
            drop(index);
            let _ = fs::remove_file(&temp);
            debug!(tier = self.name, key = %key, "Dropped superseded disk write");
            return Ok(false);
        }
        if let Err(e) = fs::rename(&temp, &path) {
            drop(index);
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        let stamp = index.next_stamp();
        index.insert(
            id,
            IndexEntry {
                path,
                size: encoded.len() as u64,
                last_access: stamp,
            },
        );
        self.stats.update_size(index.size_bytes, index.entries.len());
        Ok(true)
    }

    /// Whether any of the key's resource ids is stored.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let index = self.index.lock();
        key.resource_ids()
            .iter()
            .any(|id| index.entries.contains_key(id))
    }

    /// Remove every stored entry for the key. Returns whether any existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut removed_any = false;
        for id in key.resource_ids() {
            let removed = self.index.lock().remove(&id);
            if let Some(entry) = removed {
                remove_file_if_exists(&entry.path)?;
                removed_any = true;
            }
        }
        let index = self.index.lock();
        self.stats
            .update_size(index.size_bytes, index.entries.len());
        Ok(removed_any)
    }

    /// Remove every stored entry.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        let drained: Vec<IndexEntry> = {
            let mut index = self.index.lock();
            index.size_bytes = 0;
            index.entries.drain().map(|(_, entry)| entry).collect()
        };
        self.stats.update_size(0, 0);

        for entry in &drained {
            remove_file_if_exists(&entry.path)?;
        }
        info!(tier = self.name, files = drained.len(), "Disk cache cleared");
        Ok(())
    }

    fn drop_entry(&self, id: &str, path: &Path) {
        self.index.lock().remove(id);
        let _ = fs::remove_file(path);
    }

    /// Build the index from the files under the root.
    fn scan(&self) -> Result<(), CacheError> {
        let mut index = self.index.lock();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for file in fs::read_dir(&shard)? {
                let path = file?.path();
                let is_entry = path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION);
                if !is_entry {
                    // Leftover temp file from an interrupted write.
                    let _ = fs::remove_file(&path);
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                else {
                    continue;
                };
                let metadata = fs::metadata(&path)?;
                let last_access = metadata.modified().map_or(0, nanos_since_epoch);
                index.clock = index.clock.max(last_access);
                index.insert(
                    id,
                    IndexEntry {
                        last_access,
                        size: metadata.len(),
                        path,
                    },
                );
            }
        }

        self.stats
            .update_size(index.size_bytes, index.entries.len());
        info!(
            tier = self.name,
            entries = index.entries.len(),
            size_bytes = index.size_bytes,
            "Disk cache index built"
        );
        Ok(())
    }

    /// Evict least recently accessed entries until under 90% of the budget.
    pub fn evict_if_over_limit(&self) -> Result<(), CacheError> {
        let victims: Vec<IndexEntry> = {
            let mut index = self.index.lock();
            if index.size_bytes <= self.max_size_bytes {
                return Ok(());
            }
            let target = self.max_size_bytes / 10 * 9;

            let mut by_age: Vec<(String, u64)> = index
                .entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.last_access))
                .collect();
            by_age.sort_by_key(|(_, accessed)| *accessed);

            let mut victims = Vec::new();
            for (id, _) in by_age {
                if index.size_bytes <= target {
                    break;
                }
                if let Some(entry) = index.remove(&id) {
                    victims.push(entry);
                }
            }
            self.stats
                .update_size(index.size_bytes, index.entries.len());
            victims
        };

        let freed: u64 = victims.iter().map(|entry| entry.size).sum();
        for entry in &victims {
            remove_file_if_exists(&entry.path)?;
        }
        self.stats.record_evictions(victims.len() as u64);
        info!(
            tier = self.name,
            evicted = victims.len(),
            freed_bytes = freed,
            "Disk cache eviction complete"
        );
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn size_bytes(&self) -> u64 {
        self.index.lock().size_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> TierStatsSnapshot {
        self.stats.snapshot()
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode_entry(image: &EncodedImage, payload: &Bytes) -> Vec<u8> {
    let name = image.format().name().as_bytes();
    let name = &name[..name.len().min(u8::MAX as usize)];
    let (width, height) = image.dimensions().unwrap_or((0, 0));

    let mut out = Vec::with_capacity(FIXED_HEADER_LEN + name.len() + payload.len());
    out.extend_from_slice(ENTRY_MAGIC);
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&image.rotation_angle().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> Option<[u8; N]> {
    data.get(offset..offset + N)?.try_into().ok()
}

fn decode_entry(path: &Path, data: Vec<u8>) -> Result<StoredEntry, CacheError> {
    let corrupt = |reason: &str| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if data.len() < FIXED_HEADER_LEN || &data[..4] != ENTRY_MAGIC {
        return Err(corrupt("bad magic"));
    }
    let name_len = data[4] as usize;
    let header_len = FIXED_HEADER_LEN + name_len;
    if data.len() < header_len {
        return Err(corrupt("truncated header"));
    }

    let name = std::str::from_utf8(&data[5..5 + name_len]).map_err(|_| corrupt("format name"))?;
    let base = 5 + name_len;
    let width = u32::from_le_bytes(read_array(&data, base).ok_or_else(|| corrupt("width"))?);
    let height = u32::from_le_bytes(read_array(&data, base + 4).ok_or_else(|| corrupt("height"))?);
    let rotation =
        u16::from_le_bytes(read_array(&data, base + 8).ok_or_else(|| corrupt("rotation"))?);
    let payload_len =
        u64::from_le_bytes(read_array(&data, base + 10).ok_or_else(|| corrupt("length"))?);

    if (data.len() - header_len) as u64 != payload_len {
        return Err(corrupt("payload length mismatch"));
    }

    let format = ImageFormat::from_name(name);
    let mut data = Bytes::from(data);
    let payload = data.split_off(header_len);

    Ok(StoredEntry {
        bytes: payload,
        format,
        dimensions: (width > 0 && height > 0).then_some((width, height)),
        rotation_angle: rotation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([1, 2, 3, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn storage(dir: &TempDir, max: u64) -> DiskStorage {
        DiskStorage::new("test", dir.path().to_path_buf(), max).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_bytes_and_metadata() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let key = CacheKey::simple("https://x.test/a.png");
        let bytes = png_bytes(5, 4);
        let image = EncodedImage::from_bytes(bytes.clone()).with_rotation_angle(90);

        storage.insert(&key, &image).unwrap();
        let stored = storage.get(&key).unwrap().unwrap();

        assert_eq!(&stored.bytes[..], &bytes[..]);
        assert_eq!(stored.format, ImageFormat::Png);
        assert_eq!(stored.dimensions, Some((5, 4)));
        assert_eq!(stored.rotation_angle, 90);

        let rebuilt = stored.into_encoded();
        assert_eq!(rebuilt.size(), bytes.len());
        assert_eq!(rebuilt.format(), ImageFormat::Png);
    }

    #[test]
    fn test_miss_returns_none() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);

        assert!(storage.get(&CacheKey::simple("nope")).unwrap().is_none());
        assert_eq!(storage.stats().misses, 1);
    }

    #[test]
    fn test_index_rebuilt_on_reopen() {
        let dir = TempDir::new().unwrap();
        let key = CacheKey::simple("persisted");
        {
            let storage = storage(&dir, 1 << 20);
            storage
                .insert(&key, &EncodedImage::from_bytes(vec![9u8; 32]))
                .unwrap();
        }

        let reopened = storage(&dir, 1 << 20);
        assert!(reopened.contains(&key));
        assert_eq!(reopened.entry_count(), 1);
        assert_eq!(&reopened.get(&key).unwrap().unwrap().bytes[..], &[9u8; 32][..]);
    }

    #[test]
    fn test_second_insert_replaces_first() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let key = CacheKey::simple("k");

        storage.insert(&key, &EncodedImage::from_bytes(vec![1u8; 10])).unwrap();
        storage.insert(&key, &EncodedImage::from_bytes(vec![2u8; 20])).unwrap();

        assert_eq!(storage.entry_count(), 1);
        assert_eq!(&storage.get(&key).unwrap().unwrap().bytes[..], &[2u8; 20][..]);
    }

    #[test]
    fn test_multi_key_reads_any_component() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let alternate = CacheKey::simple("https://x.test/lo.jpg");
        storage
            .insert(&alternate, &EncodedImage::from_bytes(vec![3u8; 8]))
            .unwrap();

        let multi = CacheKey::multi(vec![CacheKey::simple("https://x.test/hi.jpg"), alternate]);
        assert!(storage.contains(&multi));
        assert!(storage.get(&multi).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_dropped() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let key = CacheKey::simple("corrupt");
        storage
            .insert(&key, &EncodedImage::from_bytes(vec![1u8; 16]))
            .unwrap();

        let id = key.primary_resource_id().unwrap();
        fs::write(storage.entry_path(&id), b"garbage").unwrap();

        assert!(storage.get(&key).unwrap().is_none());
        assert!(!storage.contains(&key));
    }

    #[test]
    fn test_eviction_to_ninety_percent() {
        let dir = TempDir::new().unwrap();
        let entry_size = (FIXED_HEADER_LEN + "unknown".len() + 100) as u64;
        let storage = storage(&dir, entry_size * 3);

        for i in 0..4 {
            storage
                .insert(
                    &CacheKey::simple(format!("k{i}")),
                    &EncodedImage::from_bytes(vec![i as u8; 100]),
                )
                .unwrap();
        }

        assert!(storage.size_bytes() <= storage.max_size_bytes() / 10 * 9);
        assert!(!storage.contains(&CacheKey::simple("k0")));
        assert!(storage.contains(&CacheKey::simple("k3")));
        assert!(storage.stats().evictions >= 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let a = CacheKey::simple("a");
        let b = CacheKey::simple("b");
        storage.insert(&a, &EncodedImage::from_bytes(vec![1u8])).unwrap();
        storage.insert(&b, &EncodedImage::from_bytes(vec![2u8])).unwrap();

        assert!(storage.remove(&a).unwrap());
        assert!(!storage.remove(&a).unwrap());
        assert!(storage.contains(&b));

        storage.clear_all().unwrap();
        assert_eq!(storage.entry_count(), 0);
        assert_eq!(storage.size_bytes(), 0);
    }

    #[test]
    fn test_unwanted_insert_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, 1 << 20);
        let key = CacheKey::simple("dropped");

        let stored = storage
            .insert_if(&key, &EncodedImage::from_bytes(vec![4u8; 64]), || false)
            .unwrap();

        assert!(!stored);
        assert!(!storage.contains(&key));
        assert_eq!(storage.stats().writes, 0);
        let shard = storage.entry_path(&key.primary_resource_id().unwrap());
        let leftovers = fs::read_dir(shard.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DiskStorage::new("test", dir.path().to_path_buf(), 0),
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
