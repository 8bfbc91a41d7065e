//! Decoder capability and the default format dispatcher.
//!
//! The pipeline only needs "encoded bytes + metadata in, decoded image out".
//! [`DefaultImageDecoder`] picks a decoder per request: a per-request
//! override first, then decoders registered for a format, then the built-in
//! handling backed by the `image` crate.

mod default;
mod static_decoder;

pub use default::DefaultImageDecoder;
pub use static_decoder::StaticImageDecoder;

use crate::artifact::{DecodedImage, EncodedImage, ImageFormat, QualityInfo};
use crate::request::DecodeOptions;
use thiserror::Error;

/// Decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes match no known or registered format
    #[error("Unknown image format")]
    UnknownFormat,

    /// The format is known but nothing can decode it
    #[error("No decoder available for format '{0}'")]
    Unsupported(ImageFormat),

    /// No bytes to decode
    #[error("Encoded image is empty")]
    Empty,

    /// The encoded buffer was released before decoding
    #[error("Encoded image buffer already released")]
    Released,

    /// The decoder rejected the data
    #[error("Malformed {format} data: {message}")]
    Malformed {
        format: ImageFormat,
        message: String,
    },
}

/// Turns an encoded artifact into a decoded image.
pub trait ImageDecoder: Send + Sync {
    /// Decode the first `length` bytes of `encoded`.
    ///
    /// `length` is smaller than the buffer for progressive intermediates;
    /// `quality` describes how complete those bytes are.
    fn decode(
        &self,
        encoded: &EncodedImage,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError>;

    /// Identity of the decoder, part of decoded cache keys when it is used
    /// as a per-request override.
    fn name(&self) -> &str;
}

/// Recognises a format the built-in detection does not know.
pub trait FormatChecker: Send + Sync {
    /// Number of leading bytes `detect` needs.
    fn header_size(&self) -> usize;

    fn detect(&self, header: &[u8]) -> Option<ImageFormat>;
}
