//! HTTP(S) fetching with `reqwest`.

use super::{ByteStream, FetchError, Fetcher};
use crate::request::ImageSource;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, warn};

/// Default whole-request timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("imagepipe/", env!("CARGO_PKG_VERSION"));

/// Streams response bodies from `http` and `https` URLs.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and a pooled client.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetchError::Network {
                uri: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, source: &ImageSource) -> ByteStream {
        let client = self.client.clone();
        let uri = source.uri().to_string();

        stream::once(async move {
            let response = client.get(&uri).send().await.map_err(|e| {
                warn!(uri = %uri, error = %e, is_timeout = e.is_timeout(), "HTTP request failed");
                FetchError::Network {
                    uri: uri.clone(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            debug!(uri = %uri, status = status.as_u16(), "HTTP response received");
            if !status.is_success() {
                return Err(FetchError::Http {
                    uri,
                    status: status.as_u16(),
                });
            }

            Ok(response.bytes_stream().map_err(move |e| FetchError::Network {
                uri: uri.clone(),
                message: e.to_string(),
            }))
        })
        .try_flatten()
        .boxed()
    }
}
