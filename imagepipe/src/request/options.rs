//! Resize, rotation and decode options.

use crate::decoder::ImageDecoder;
use std::fmt;
use std::sync::Arc;

/// Target size the decoded image should fit within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
}

impl ResizeOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether an image of the given size has to shrink to fit.
    pub fn requires_downscale(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && (width > self.width || height > self.height)
    }
}

/// How the decoded image's rotation metadata is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RotationOptions {
    /// Honour the rotation recorded in the encoded data.
    pub auto_rotate: bool,
    /// Explicit angle, overriding the encoded one.
    pub forced_angle: Option<u16>,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self::auto()
    }
}

impl RotationOptions {
    pub fn auto() -> Self {
        Self {
            auto_rotate: true,
            forced_angle: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            auto_rotate: false,
            forced_angle: None,
        }
    }

    pub fn forced(angle: u16) -> Self {
        Self {
            auto_rotate: false,
            forced_angle: Some(angle % 360),
        }
    }

    /// Angle to record on a decoded image whose encoded angle is `encoded`.
    pub fn effective_angle(&self, encoded: u16) -> u16 {
        match self.forced_angle {
            Some(angle) => angle,
            None if self.auto_rotate => encoded % 360,
            None => 0,
        }
    }
}

/// Options handed to the decoder.
#[derive(Clone, Default)]
pub struct DecodeOptions {
    /// Decode only the first frame of animated formats.
    pub force_static_image: bool,
    /// Decoder that overrides format-based selection for this request.
    pub custom_decoder: Option<Arc<dyn ImageDecoder>>,
    /// Size the decoder should fit the result within.
    pub target_size: Option<ResizeOptions>,
}

impl DecodeOptions {
    pub fn with_force_static_image(mut self, force: bool) -> Self {
        self.force_static_image = force;
        self
    }

    pub fn with_custom_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.custom_decoder = Some(decoder);
        self
    }

    pub fn with_target_size(mut self, size: Option<ResizeOptions>) -> Self {
        self.target_size = size;
        self
    }

    /// Name of the overriding decoder, used in decoded cache keys.
    pub fn custom_decoder_name(&self) -> Option<&str> {
        self.custom_decoder.as_ref().map(|decoder| decoder.name())
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("force_static_image", &self.force_static_image)
            .field("custom_decoder", &self.custom_decoder_name())
            .field("target_size", &self.target_size)
            .finish()
    }
}
