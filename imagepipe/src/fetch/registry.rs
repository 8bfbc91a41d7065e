//! Fetcher selection by source type.

use super::{ByteStream, DataFetcher, FetchError, Fetcher, HttpFetcher, LocalFileFetcher};
use crate::request::{ImageSource, SourceType};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each [`SourceType`] to the fetcher that handles it.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<SourceType, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    /// An empty registry; every source is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP, local file and data URI fetchers.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Ok(Self::new()
            .with_fetcher(SourceType::Network, Arc::new(HttpFetcher::new()?))
            .with_fetcher(SourceType::LocalFile, Arc::new(LocalFileFetcher::new()))
            .with_fetcher(SourceType::Data, Arc::new(DataFetcher::new())))
    }

    /// Register or replace the fetcher for `kind`.
    pub fn with_fetcher(mut self, kind: SourceType, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.insert(kind, fetcher);
        self
    }

    pub fn get(&self, kind: SourceType) -> Option<&Arc<dyn Fetcher>> {
        self.fetchers.get(&kind)
    }

    /// Fetch with the registered fetcher, or fail with `UnsupportedSource`.
    pub fn fetch(&self, source: &ImageSource) -> ByteStream {
        match self.get(source.kind()) {
            Some(fetcher) => fetcher.fetch(source),
            None => stream::once(futures::future::ready(Err(FetchError::UnsupportedSource {
                uri: source.uri().to_string(),
            })))
            .boxed(),
        }
    }
}
