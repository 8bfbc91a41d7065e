//! Fallback decoder for still images, built on the `image` crate.

use super::{DecodeError, ImageDecoder};
use crate::artifact::{DecodedImage, EncodedImage, ImageFormat, QualityInfo};
use crate::request::DecodeOptions;
use image::DynamicImage;

/// Decodes every format the `image` crate supports as a single still frame,
/// fitting the result within the requested target size.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticImageDecoder;

impl StaticImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a prefix of the data. Used for progressive JPEG intermediates.
    pub fn decode_prefix(
        &self,
        encoded: &EncodedImage,
        format: ImageFormat,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        let bytes = encoded.bytes().ok_or(DecodeError::Released)?;
        let data = &bytes[..length.min(bytes.len())];
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let image_format = format
            .to_image_format()
            .ok_or(DecodeError::Unsupported(format))?;
        let decoded = image::load_from_memory_with_format(data, image_format).map_err(|e| {
            DecodeError::Malformed {
                format,
                message: e.to_string(),
            }
        })?;

        Ok(DecodedImage::new(fit(decoded, options).to_rgba8(), format)
            .with_quality(quality)
            .with_rotation_angle(encoded.rotation_angle()))
    }

    /// Decode the whole buffer as `format`.
    pub fn decode_full(
        &self,
        encoded: &EncodedImage,
        format: ImageFormat,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        self.decode_prefix(encoded, format, encoded.size(), QualityInfo::FULL, options)
    }
}

fn fit(image: DynamicImage, options: &DecodeOptions) -> DynamicImage {
    match options.target_size {
        Some(target) if target.requires_downscale(image.width(), image.height()) => {
            image.thumbnail(target.width, target.height)
        }
        _ => image,
    }
}

impl ImageDecoder for StaticImageDecoder {
    fn decode(
        &self,
        encoded: &EncodedImage,
        length: usize,
        quality: QualityInfo,
        options: &DecodeOptions,
    ) -> Result<DecodedImage, DecodeError> {
        self.decode_prefix(encoded, encoded.format(), length, quality, options)
    }

    fn name(&self) -> &str {
        "static"
    }
}
