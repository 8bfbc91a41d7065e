//! Encoded image artifact.

use super::format::{ImageFormat, HEADER_DETECTION_LEN};
use crate::resource::{ResourceError, ResourceHandle};
use bytes::Bytes;
use std::io::Cursor;

/// A shared encoded buffer plus decode metadata.
///
/// Produced by fetch and cache-read stages, consumed by decode and
/// cache-write stages. Cloning goes through [`try_clone`](Self::try_clone),
/// which acquires a new reference on the buffer instead of copying bytes.
#[derive(Debug)]
pub struct EncodedImage {
    buffer: ResourceHandle<Bytes>,
    format: ImageFormat,
    rotation_angle: u16,
    dimensions: Option<(u32, u32)>,
    complete: bool,
}

impl EncodedImage {
    /// Wrap a complete buffer and parse its metadata.
    pub fn new(buffer: ResourceHandle<Bytes>) -> Self {
        let mut image = Self {
            buffer,
            format: ImageFormat::Unknown,
            rotation_angle: 0,
            dimensions: None,
            complete: true,
        };
        image.parse_metadata();
        image
    }

    /// Wrap owned bytes as a complete artifact.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(ResourceHandle::new(bytes.into()))
    }

    /// Wrap the bytes received so far of a progressive download.
    pub fn partial(bytes: impl Into<Bytes>) -> Self {
        let mut image = Self::from_bytes(bytes);
        image.complete = false;
        image
    }

    /// Build an artifact from a cached buffer with already-known metadata.
    pub fn from_parts(
        buffer: ResourceHandle<Bytes>,
        format: ImageFormat,
        dimensions: Option<(u32, u32)>,
        rotation_angle: u16,
    ) -> Self {
        Self {
            buffer,
            format,
            rotation_angle,
            dimensions,
            complete: true,
        }
    }

    /// Re-read format and dimensions from the buffer contents.
    pub fn parse_metadata(&mut self) {
        let Some(bytes) = self.buffer.get() else {
            return;
        };
        let header_len = bytes.len().min(HEADER_DETECTION_LEN);
        self.format = ImageFormat::detect(&bytes[..header_len]);
        self.dimensions = self.format.to_image_format().and_then(|format| {
            image::ImageReader::with_format(Cursor::new(&bytes[..]), format)
                .into_dimensions()
                .ok()
        });
    }

    /// Acquire a new reference to the same buffer, copying the metadata.
    pub fn try_clone(&self) -> Result<Self, ResourceError> {
        Ok(Self {
            buffer: self.buffer.try_acquire()?,
            format: self.format,
            rotation_angle: self.rotation_angle,
            dimensions: self.dimensions,
            complete: self.complete,
        })
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_rotation_angle(mut self, angle: u16) -> Self {
        self.rotation_angle = angle % 360;
        self
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        self.buffer.get()
    }

    pub fn buffer(&self) -> &ResourceHandle<Bytes> {
        &self.buffer
    }

    /// Byte length of the buffer, zero once closed.
    pub fn size(&self) -> usize {
        self.buffer.get().map_or(0, Bytes::len)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn rotation_angle(&self) -> u16 {
        self.rotation_angle
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// False for intermediate data of a progressive download.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_valid(&self) -> bool {
        self.buffer.is_valid()
    }

    /// Release this artifact's reference to the buffer.
    pub fn close(&mut self) -> Result<(), ResourceError> {
        self.buffer.close()
    }
}
