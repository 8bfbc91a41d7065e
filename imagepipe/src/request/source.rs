//! Request source classification.

use std::path::PathBuf;
use url::Url;

/// Kind of location an image is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// `http` or `https` URL.
    Network,
    /// `file` URL or bare filesystem path.
    LocalFile,
    /// `data:` URI with inline content.
    Data,
    /// Anything else; no fetcher handles it by default.
    Unknown,
}

/// A request's source URI and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageSource {
    uri: String,
    kind: SourceType,
}

impl ImageSource {
    /// Classify a URI. Strings without a scheme are treated as file paths.
    pub fn parse(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let kind = match Url::parse(&uri) {
            Ok(url) => match url.scheme() {
                "http" | "https" => SourceType::Network,
                "file" => SourceType::LocalFile,
                "data" => SourceType::Data,
                _ => SourceType::Unknown,
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => SourceType::LocalFile,
            Err(_) => SourceType::Unknown,
        };
        Self { uri, kind }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> SourceType {
        self.kind
    }

    /// Filesystem path for local sources.
    pub fn local_path(&self) -> Option<PathBuf> {
        if self.kind != SourceType::LocalFile {
            return None;
        }
        match Url::parse(&self.uri) {
            Ok(url) => url.to_file_path().ok(),
            Err(_) => Some(PathBuf::from(&self.uri)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ImageSource::parse("https://example.com/a.jpg").kind(),
            SourceType::Network
        );
        assert_eq!(
            ImageSource::parse("http://example.com/a.jpg").kind(),
            SourceType::Network
        );
        assert_eq!(
            ImageSource::parse("file:///tmp/a.png").kind(),
            SourceType::LocalFile
        );
        assert_eq!(ImageSource::parse("images/a.png").kind(), SourceType::LocalFile);
        assert_eq!(
            ImageSource::parse("data:image/png;base64,AAAA").kind(),
            SourceType::Data
        );
        assert_eq!(
            ImageSource::parse("content://media/42").kind(),
            SourceType::Unknown
        );
    }

    #[test]
    fn test_local_path() {
        assert_eq!(
            ImageSource::parse("file:///tmp/a.png").local_path(),
            Some(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!(
            ImageSource::parse("relative/b.png").local_path(),
            Some(PathBuf::from("relative/b.png"))
        );
        assert_eq!(ImageSource::parse("https://x.test/a").local_path(), None);
    }
}
