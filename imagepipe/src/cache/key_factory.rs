//! Derivation of cache keys from requests.

use super::key::{CacheKey, DecodedCacheKey, SimpleCacheKey};
use crate::postprocess::Postprocessor;
use crate::request::{CallerContext, ImageRequest, ResizeOptions};

/// Maps requests to cache keys.
///
/// Implementations must be deterministic: the same logical request always
/// yields an equal key, and anything that changes the decoded pixels must be
/// part of the decoded and postprocessed keys.
pub trait CacheKeyFactory: Send + Sync {
    /// Key of the encoded bytes.
    fn encoded_key(&self, request: &ImageRequest, caller: Option<&CallerContext>) -> CacheKey;

    /// Key of the decoded image at the given target size.
    fn decoded_key(
        &self,
        request: &ImageRequest,
        caller: Option<&CallerContext>,
        resize: Option<ResizeOptions>,
    ) -> CacheKey;

    /// Key of the postprocessed image, or `None` if the postprocessor's output
    /// must not be cached.
    fn postprocessed_key(
        &self,
        request: &ImageRequest,
        postprocessor: &dyn Postprocessor,
        caller: Option<&CallerContext>,
    ) -> Option<CacheKey>;
}

/// Keys by source URI plus the request's decode-affecting options.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCacheKeyFactory;

impl DefaultCacheKeyFactory {
    fn decoded(
        request: &ImageRequest,
        resize: Option<ResizeOptions>,
        postprocessor: Option<CacheKey>,
    ) -> DecodedCacheKey {
        DecodedCacheKey {
            source_uri: request.uri().to_string(),
            resize,
            rotation: request.rotation(),
            force_static_image: request.decode_options().force_static_image,
            custom_decoder: request
                .decode_options()
                .custom_decoder_name()
                .map(str::to_string),
            postprocessor,
        }
    }
}

impl CacheKeyFactory for DefaultCacheKeyFactory {
    fn encoded_key(&self, request: &ImageRequest, caller: Option<&CallerContext>) -> CacheKey {
        let simple = |uri: &str| {
            CacheKey::Simple(
                SimpleCacheKey::new(uri).with_debug_info(caller.cloned(), Some(uri.to_string())),
            )
        };

        if request.alternate_sources().is_empty() {
            return simple(request.uri());
        }

        let mut keys = vec![simple(request.uri())];
        keys.extend(request.alternate_sources().iter().map(|s| simple(s.uri())));
        CacheKey::multi(keys)
    }

    fn decoded_key(
        &self,
        request: &ImageRequest,
        _caller: Option<&CallerContext>,
        resize: Option<ResizeOptions>,
    ) -> CacheKey {
        CacheKey::Decoded(Box::new(Self::decoded(request, resize, None)))
    }

    fn postprocessed_key(
        &self,
        request: &ImageRequest,
        postprocessor: &dyn Postprocessor,
        _caller: Option<&CallerContext>,
    ) -> Option<CacheKey> {
        let postprocessor_key = postprocessor.cache_key()?;
        Some(CacheKey::Decoded(Box::new(Self::decoded(
            request,
            request.resize(),
            Some(postprocessor_key),
        ))))
    }
}
