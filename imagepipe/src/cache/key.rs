//! Cache keys.
//!
//! Keys are plain values: equal keys address the same artifact in every tier.
//! Debugging metadata (caller context, source URI) rides along on simple keys
//! without affecting equality or hashing.

use crate::request::{CallerContext, ResizeOptions, RotationOptions};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a cacheable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single string identity, typically the source URI.
    Simple(SimpleCacheKey),
    /// Several identities for content reachable under more than one URI. A
    /// lookup matches if any component matches.
    Multi(MultiCacheKey),
    /// Identity of a decoded (and possibly postprocessed) image.
    Decoded(Box<DecodedCacheKey>),
}

impl CacheKey {
    pub fn simple(key: impl Into<String>) -> Self {
        Self::Simple(SimpleCacheKey::new(key))
    }

    pub fn multi(keys: Vec<CacheKey>) -> Self {
        Self::Multi(MultiCacheKey { keys })
    }

    /// Whether this key refers to content fetched from `uri`.
    pub fn contains_uri(&self, uri: &str) -> bool {
        match self {
            Self::Simple(key) => key.contains_uri(uri),
            Self::Multi(multi) => multi.keys.iter().any(|key| key.contains_uri(uri)),
            Self::Decoded(decoded) => decoded.source_uri == uri,
        }
    }

    /// Canonical string form.
    pub fn key_string(&self) -> String {
        match self {
            Self::Simple(key) => key.key.clone(),
            Self::Multi(multi) => multi
                .keys
                .iter()
                .map(CacheKey::key_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Decoded(decoded) => decoded.key_string(),
        }
    }

    /// Stable storage identifiers, one per component identity.
    ///
    /// Disk tiers try these in order on reads and write under the first.
    pub fn resource_ids(&self) -> Vec<String> {
        match self {
            Self::Multi(multi) => multi.keys.iter().flat_map(CacheKey::resource_ids).collect(),
            other => vec![sha256_hex(&other.key_string())],
        }
    }

    /// Identifier new entries are written under.
    pub fn primary_resource_id(&self) -> Option<String> {
        self.resource_ids().into_iter().next()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_string())
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Key built from a single string.
#[derive(Clone)]
pub struct SimpleCacheKey {
    key: String,
    caller_context: Option<CallerContext>,
    source_uri: Option<String>,
}

impl SimpleCacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            caller_context: None,
            source_uri: None,
        }
    }

    /// Attach debugging metadata. Ignored by equality.
    pub fn with_debug_info(
        mut self,
        caller_context: Option<CallerContext>,
        source_uri: Option<String>,
    ) -> Self {
        self.caller_context = caller_context;
        self.source_uri = source_uri;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn caller_context(&self) -> Option<&CallerContext> {
        self.caller_context.as_ref()
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.key.contains(uri)
    }
}

impl PartialEq for SimpleCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SimpleCacheKey {}

impl Hash for SimpleCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for SimpleCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleCacheKey")
            .field("key", &self.key)
            .field("caller_context", &self.caller_context)
            .finish()
    }
}

/// Ordered list of alternative identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiCacheKey {
    keys: Vec<CacheKey>,
}

impl MultiCacheKey {
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }
}

/// Identity of a decoded image: everything that changes its pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedCacheKey {
    pub source_uri: String,
    pub resize: Option<ResizeOptions>,
    pub rotation: RotationOptions,
    pub force_static_image: bool,
    pub custom_decoder: Option<String>,
    pub postprocessor: Option<CacheKey>,
}

impl DecodedCacheKey {
    fn key_string(&self) -> String {
        let mut out = self.source_uri.clone();
        if let Some(resize) = self.resize {
            out.push_str(&format!("#resize={}x{}", resize.width, resize.height));
        }
        out.push_str(&format!(
            "#rotate={}:{}",
            self.rotation.auto_rotate,
            self.rotation.forced_angle.map_or(-1, i32::from)
        ));
        if self.force_static_image {
            out.push_str("#static");
        }
        if let Some(decoder) = &self.custom_decoder {
            out.push_str(&format!("#decoder={decoder}"));
        }
        if let Some(postprocessor) = &self.postprocessor {
            out.push_str(&format!("#post={postprocessor}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_debug_info_does_not_affect_equality() {
        let a = SimpleCacheKey::new("https://x.test/a.jpg")
            .with_debug_info(Some(CallerContext::new("feed")), Some("one".into()));
        let b = SimpleCacheKey::new("https://x.test/a.jpg")
            .with_debug_info(Some(CallerContext::new("profile")), None);

        assert_eq!(a, b);
        let set: HashSet<_> = [CacheKey::Simple(a), CacheKey::Simple(b)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_multi_key_contains_any_component() {
        let key = CacheKey::multi(vec![
            CacheKey::simple("https://x.test/large.jpg"),
            CacheKey::simple("https://x.test/small.jpg"),
        ]);

        assert!(key.contains_uri("https://x.test/small.jpg"));
        assert!(!key.contains_uri("https://x.test/other.jpg"));
        assert_eq!(key.resource_ids().len(), 2);
    }

    #[test]
    fn test_resource_ids_are_stable_hex() {
        let ids = CacheKey::simple("abc").resource_ids();
        assert_eq!(
            ids,
            vec!["ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string()]
        );
    }

    #[test]
    fn test_decoded_keys_differ_by_resize() {
        let base = DecodedCacheKey {
            source_uri: "https://x.test/a.jpg".into(),
            resize: None,
            rotation: RotationOptions::auto(),
            force_static_image: false,
            custom_decoder: None,
            postprocessor: None,
        };
        let resized = DecodedCacheKey {
            resize: Some(ResizeOptions::new(64, 64)),
            ..base.clone()
        };

        let a = CacheKey::Decoded(Box::new(base));
        let b = CacheKey::Decoded(Box::new(resized));
        assert_ne!(a, b);
        assert_ne!(a.resource_ids(), b.resource_ids());
        assert!(b.contains_uri("https://x.test/a.jpg"));
    }
}
