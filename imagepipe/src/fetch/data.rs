//! Inline `data:` URIs.

use super::{ByteStream, FetchError, Fetcher};
use crate::request::ImageSource;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

/// Decodes `data:[<media type>][;base64],<payload>` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataFetcher;

impl DataFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Decode the payload of a data URI.
    pub fn decode(uri: &str) -> Result<Bytes, FetchError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| FetchError::InvalidData("missing 'data:' scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| FetchError::InvalidData("missing ',' separator".to_string()))?;

        if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
            STANDARD
                .decode(payload.trim())
                .map(Bytes::from)
                .map_err(|e| FetchError::InvalidData(e.to_string()))
        } else {
            percent_decode(payload).map(Bytes::from)
        }
    }
}

fn percent_decode(input: &str) -> Result<Vec<u8>, FetchError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| FetchError::InvalidData(format!("bad escape at offset {i}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

impl Fetcher for DataFetcher {
    fn name(&self) -> &str {
        "data"
    }

    fn fetch(&self, source: &ImageSource) -> ByteStream {
        stream::once(futures::future::ready(Self::decode(source.uri()))).boxed()
    }
}
