//! Encoded and decoded image artifacts flowing through the pipeline.
//!
//! An [`EncodedImage`] is a reference-counted byte buffer plus the metadata
//! needed to decode it (format, rotation, dimensions, completeness). A
//! [`DecodedImage`] is the RGBA output of a decoder, shared between caches and
//! consumers through [`ImageRef`].

mod decoded;
mod encoded;
mod format;

pub use decoded::{DecodedImage, ImageRef, QualityInfo};
pub use encoded::EncodedImage;
pub use format::ImageFormat;
