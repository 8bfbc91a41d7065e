//! Decoded image artifact.

use super::format::ImageFormat;
use crate::resource::ResourceHandle;
use image::RgbaImage;

/// Shared handle to a decoded image, as stored in the decoded memory cache
/// and delivered to consumers.
pub type ImageRef = ResourceHandle<DecodedImage>;

/// Progressive quality of a decoded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityInfo {
    /// Number of data chunks (scans) that went into the decode.
    pub quality: u32,
    /// Whether the result is good enough to display without a better one.
    pub good_enough: bool,
    /// Whether the result was decoded from complete data.
    pub full_quality: bool,
}

impl QualityInfo {
    pub const FULL: QualityInfo = QualityInfo {
        quality: u32::MAX,
        good_enough: true,
        full_quality: true,
    };

    /// Quality of an intermediate decode from `quality` chunks.
    pub fn partial(quality: u32, good_enough: bool) -> Self {
        Self {
            quality,
            good_enough,
            full_quality: false,
        }
    }
}

/// RGBA pixels plus the metadata a renderer needs.
///
/// Rotation is carried as metadata; pixels are stored as decoded.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbaImage,
    rotation_angle: u16,
    quality: QualityInfo,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn new(pixels: RgbaImage, format: ImageFormat) -> Self {
        Self {
            pixels,
            rotation_angle: 0,
            quality: QualityInfo::FULL,
            format,
        }
    }

    pub fn with_rotation_angle(mut self, angle: u16) -> Self {
        self.rotation_angle = angle % 360;
        self
    }

    pub fn with_quality(mut self, quality: QualityInfo) -> Self {
        self.quality = quality;
        self
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn rotation_angle(&self) -> u16 {
        self.rotation_angle
    }

    pub fn quality(&self) -> QualityInfo {
        self.quality
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Bytes held by the pixel buffer.
    pub fn size_in_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}
