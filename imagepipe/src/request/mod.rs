//! Image requests and the options that shape them.

mod caller;
mod image_request;
mod level;
mod options;
mod source;

pub use caller::CallerContext;
pub use image_request::ImageRequest;
pub use level::{CacheChoice, Priority, RequestLevel};
pub use options::{DecodeOptions, ResizeOptions, RotationOptions};
pub use source::{ImageSource, SourceType};
