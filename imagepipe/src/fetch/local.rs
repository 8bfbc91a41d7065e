//! Local filesystem fetching.

use super::{ByteStream, FetchError, Fetcher};
use crate::request::ImageSource;
use bytes::BytesMut;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::io::AsyncReadExt;

/// Read size per chunk.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Streams files named by `file://` URLs or bare paths.
#[derive(Debug, Clone, Copy)]
pub struct LocalFileFetcher {
    chunk_size: usize,
}

impl Default for LocalFileFetcher {
    fn default() -> Self {
        Self {
            chunk_size: READ_CHUNK_SIZE,
        }
    }
}

impl LocalFileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Fetcher for LocalFileFetcher {
    fn name(&self) -> &str {
        "local-file"
    }

    fn fetch(&self, source: &ImageSource) -> ByteStream {
        let uri = source.uri().to_string();
        let path = source.local_path();
        let chunk_size = self.chunk_size;

        stream::once(async move {
            let path = path.ok_or_else(|| FetchError::UnsupportedSource { uri: uri.clone() })?;
            let io_error = move |e: std::io::Error| FetchError::Io {
                uri: uri.clone(),
                message: e.to_string(),
            };
            let file = tokio::fs::File::open(&path).await.map_err(&io_error)?;

            let chunks = stream::try_unfold(file, move |mut file| async move {
                let mut buf = BytesMut::with_capacity(chunk_size);
                let read = file.read_buf(&mut buf).await?;
                Ok::<_, std::io::Error>((read > 0).then(|| (buf.freeze(), file)))
            });
            Ok::<_, FetchError>(chunks.map_err(io_error))
        })
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_file_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(&path, &content).unwrap();

        let chunks: Vec<_> = LocalFileFetcher::with_chunk_size(300)
            .fetch(&ImageSource::parse(path.to_string_lossy()))
            .try_collect()
            .await
            .unwrap();

        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.len() <= 300));
        assert_eq!(chunks.concat(), content);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.png");

        let result: Result<Vec<_>, _> = LocalFileFetcher::new()
            .fetch(&ImageSource::parse(path.to_string_lossy()))
            .try_collect()
            .await;

        assert!(matches!(result, Err(FetchError::Io { .. })));
    }

    #[tokio::test]
    async fn test_non_file_source_unsupported() {
        let result: Result<Vec<_>, _> = LocalFileFetcher::new()
            .fetch(&ImageSource::parse("https://example.com/a.png"))
            .try_collect()
            .await;

        assert!(matches!(result, Err(FetchError::UnsupportedSource { .. })));
    }
}
