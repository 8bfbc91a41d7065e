//! imagepipe - an image loading pipeline
//!
//! Requests for images identified by URI are served through a layered cache
//! (decoded memory, encoded memory, disk) and, when nothing is cached, fetched
//! from the network or the local filesystem, decoded and optionally
//! postprocessed. Concurrent requests for the same image share one
//! computation.
//!
//! # High-Level API
//!
//! ```ignore
//! use imagepipe::config::PipelineConfig;
//! use imagepipe::pipeline::ImagePipeline;
//! use imagepipe::request::{ImageRequest, ResizeOptions};
//!
//! let pipeline = ImagePipeline::builder(PipelineConfig::default()).build()?;
//!
//! let request = ImageRequest::new("https://example.com/photo.jpg")
//!     .with_resize(ResizeOptions::new(320, 240));
//! let image = pipeline.fetch_decoded_image(request, None).result().await?;
//! ```

pub mod artifact;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod postprocess;
pub mod producers;
pub mod request;
pub mod resource;

pub use artifact::{DecodedImage, EncodedImage, ImageFormat, ImageRef, QualityInfo};
pub use error::{ErrorKind, PipelineError};
pub use pipeline::{DataSource, ImagePipeline, PipelineEvent};
pub use request::ImageRequest;
