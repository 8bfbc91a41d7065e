//! Fetcher capability: encoded bytes from a request's source.
//!
//! A fetcher yields the body as a stream of chunks so the fetch stage can
//! report progress and forward partial data for progressive rendering.
//! [`FetcherRegistry`] selects a fetcher by [`SourceType`](crate::request::SourceType).

mod data;
mod http;
mod local;
mod registry;

pub use data::DataFetcher;
pub use http::{HttpFetcher, DEFAULT_HTTP_TIMEOUT_SECS};
pub use local::LocalFileFetcher;
pub use registry::FetcherRegistry;

use crate::request::ImageSource;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Body chunks of one fetch, in order.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Fetch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Local file could not be read
    #[error("I/O error reading {uri}: {message}")]
    Io { uri: String, message: String },

    /// Connection or transfer failure
    #[error("Network error fetching {uri}: {message}")]
    Network { uri: String, message: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {uri}")]
    Http { uri: String, status: u16 },

    /// No fetcher handles this source
    #[error("Unsupported image source: {uri}")]
    UnsupportedSource { uri: String },

    /// Inline data could not be decoded
    #[error("Invalid inline data: {0}")]
    InvalidData(String),
}

/// Produces the encoded bytes of an image source.
pub trait Fetcher: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Start fetching. The stream ends after the last chunk or the first error.
    fn fetch(&self, source: &ImageSource) -> ByteStream;
}
