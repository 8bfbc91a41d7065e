//! Format-dispatching decoder.

use super::static_decoder::StaticImageDecoder;
use super::{DecodeError, FormatChecker, ImageDecoder};
use crate::artifact::{DecodedImage, EncodedImage, ImageFormat, QualityInfo};
use crate::request::DecodeOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Chooses a decoder for each image.
///
/// Selection order:
/// 1. the request's own `custom_decoder`
/// 2. a decoder registered for the (re-detected if unknown) format
/// 3. built-in handling: JPEG decodes the given prefix, GIF and animated WebP
///    go to their animated decoder unless `force_static_image` is set,
///    unknown formats fail, everything else decodes as a still image
#[derive(Default)]
pub struct DefaultImageDecoder {
    custom_decoders: HashMap<ImageFormat, Arc<dyn ImageDecoder>>,
    format_checkers: Vec<Arc<dyn FormatChecker>>,
    animated_gif: Option<Arc<dyn ImageDecoder>>,
    animated_webp: Option<Arc<dyn ImageDecoder>>,
    fallback: StaticImageDecoder,
}

impl DefaultImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `decoder` for every image of `format`.
    pub fn with_custom_decoder(mut self, format: ImageFormat, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.custom_decoders.insert(format, decoder);
        self
    }

    /// Recognise additional formats before the built-in detection runs.
    pub fn with_format_checker(mut self, checker: Arc<dyn FormatChecker>) -> Self {
        self.format_checkers.push(checker);
        self
    }

    pub fn with_animated_gif_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.animated_gif = Some(decoder);
        self
    }

    pub fn with_animated_webp_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.animated_webp = Some(decoder);
        self
    }

    /// Determine the format from the buffer, registered checkers first.
    pub fn detect_format(&self, encoded: &EncodedImage) -> ImageFormat {
        let Some(bytes) = encoded.bytes() else {
            return ImageFormat::Unknown;
        };
        for checker in &self.format_checkers {
            let header = &bytes[..checker.header_size().min(bytes.len())];
            if let Some(format) = checker.detect(header) {
                return format;
            }
        }
        ImageFormat::detect(bytes)
    }

    fn decode_builtin(
        &self,
        encoded: &EncodedImage,
        format: ImageFormat,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        let animated = match format {
            ImageFormat::Gif => self.animated_gif.as_ref(),
            ImageFormat::WebpAnimated => self.animated_webp.as_ref(),
            _ => None,
        };

        match format {
            ImageFormat::Unknown => Err(DecodeError::UnknownFormat),
            ImageFormat::Custom(_) => Err(DecodeError::Unsupported(format)),
            ImageFormat::Jpeg => self
                .fallback
                .decode_prefix(encoded, format, length, quality, options),
            _ => match animated {
                Some(decoder) if !options.force_static_image => {
                    decoder.decode(encoded, length, quality, options)
                }
                _ => self.fallback.decode_full(encoded, format, options),
            },
        }
    }
}

impl ImageDecoder for DefaultImageDecoder {
    fn decode(
        &self,
        encoded: &EncodedImage,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        if let Some(decoder) = &options.custom_decoder {
            trace!(decoder = decoder.name(), "Using per-request decoder");
            return decoder.decode(encoded, length, quality, options);
        }

        let format = match encoded.format() {
            ImageFormat::Unknown => self.detect_format(encoded),
            known => known,
        };

        if let Some(decoder) = self.custom_decoders.get(&format) {
            trace!(%format, decoder = decoder.name(), "Using registered decoder");
            return decoder.decode(encoded, length, quality, options);
        }

        self.decode_builtin(encoded, format, length, quality, options)
    }

    fn name(&self) -> &str {
        "default"
    }
}
