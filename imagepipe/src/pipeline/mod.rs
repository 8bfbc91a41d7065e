//! Request submission and result delivery.
//!
//! [`ImagePipeline`] owns the cache tiers, the worker pools and the producer
//! chains. Each submitted request gets a [`DataSource`] through which its
//! events arrive:
//!
//! ```ignore
//! use imagepipe::config::PipelineConfig;
//! use imagepipe::pipeline::ImagePipeline;
//! use imagepipe::request::ImageRequest;
//!
//! let pipeline = ImagePipeline::builder(PipelineConfig::default()).build()?;
//! let image = pipeline
//!     .fetch_decoded_image(ImageRequest::new("https://example.com/a.jpg"), None)
//!     .result()
//!     .await?;
//! ```

mod data_source;
mod error;
mod facade;
mod sequence;

pub use data_source::{DataSource, PipelineEvent};
pub use error::BuildError;
pub use facade::{CoalescingStats, ImagePipeline, ImagePipelineBuilder};
