//! Pending disk writes, readable before they reach disk.

use super::key::CacheKey;
use crate::artifact::EncodedImage;
use dashmap::DashMap;

/// Encoded images whose disk write has been scheduled but not finished.
///
/// Readers consult the staging area first, so a value is visible as soon as
/// `put` returns. Each staged value is an independently owned handle copy.
#[derive(Default)]
pub struct StagingArea {
    pending: DashMap<CacheKey, EncodedImage>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a copy of `image`, replacing any earlier pending value.
    pub fn put(&self, key: CacheKey, image: &EncodedImage) {
        if let Ok(copy) = image.try_clone() {
            self.pending.insert(key, copy);
        }
    }

    /// A new reference to the staged value.
    pub fn get(&self, key: &CacheKey) -> Option<EncodedImage> {
        self.pending
            .get(key)
            .and_then(|staged| staged.try_clone().ok())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Unstage whatever is pending for `key`.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Unstage only if the pending value is still `image`; a newer put for the
    /// same key stays staged.
    pub fn remove_if_same(&self, key: &CacheKey, image: &EncodedImage) -> bool {
        self.pending
            .remove_if(key, |_, staged| {
                staged.buffer().shares_value_with(image.buffer())
            })
            .is_some()
    }

    pub fn clear_all(&self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
