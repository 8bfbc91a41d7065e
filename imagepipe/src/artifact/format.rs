//! Image format tags and magic-byte detection.

use std::fmt;

/// Bytes needed to recognise every built-in format.
pub const HEADER_DETECTION_LEN: usize = 21;

/// Format tag attached to encoded artifacts.
///
/// The built-in variants cover what the fallback decoder understands.
/// `Custom` carries the name of a format recognised by a registered
/// format checker and decoded by a registered decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Ico,
    Webp,
    WebpAnimated,
    Custom(&'static str),
    Unknown,
}

impl ImageFormat {
    /// Detect the format from the leading bytes of an encoded buffer.
    pub fn detect(header: &[u8]) -> Self {
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if header.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Self::Png
        } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            Self::Gif
        } else if header.starts_with(b"BM") {
            Self::Bmp
        } else if header.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            Self::Ico
        } else if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
            Self::detect_webp_variant(header)
        } else {
            Self::Unknown
        }
    }

    // VP8X extended header: flags byte at offset 20, animation bit 0x02.
    fn detect_webp_variant(header: &[u8]) -> Self {
        if header.len() > 20 && &header[12..16] == b"VP8X" && header[20] & 0x02 != 0 {
            Self::WebpAnimated
        } else {
            Self::Webp
        }
    }

    /// Stable lowercase name, used in disk entry headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Ico => "ico",
            Self::Webp => "webp",
            Self::WebpAnimated => "webp_animated",
            Self::Custom(name) => *name,
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`name`](Self::name) for built-in formats.
    ///
    /// Custom formats come back as `Unknown` and are re-detected from their
    /// bytes at decode time.
    pub fn from_name(name: &str) -> Self {
        match name {
            "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "bmp" => Self::Bmp,
            "ico" => Self::Ico,
            "webp" => Self::Webp,
            "webp_animated" => Self::WebpAnimated,
            _ => Self::Unknown,
        }
    }

    /// Whether partial data of this format can be decoded progressively.
    pub fn supports_progressive(&self) -> bool {
        matches!(self, Self::Jpeg)
    }

    /// Whether the format can carry multiple frames.
    pub fn is_animated_capable(&self) -> bool {
        matches!(self, Self::Gif | Self::WebpAnimated)
    }

    /// Corresponding `image` crate format, if the fallback decoder handles it.
    pub fn to_image_format(&self) -> Option<image::ImageFormat> {
        match self {
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::Bmp => Some(image::ImageFormat::Bmp),
            Self::Ico => Some(image::ImageFormat::Ico),
            Self::Webp | Self::WebpAnimated => Some(image::ImageFormat::WebP),
            Self::Custom(_) | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
