use bytes::Bytes;
use http::Method;
use reqwest::header::ETAG;
use reqwest::header::HeaderMap;
use std::path::PathBuf;

/// A byte range of a file on disk, sent as a request body.
///
/// The file is re-opened for every attempt, so a request carrying it can be
/// cloned and retried without buffering the file in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRange {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<FileRange>,
}

impl Request {
    pub fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url.into())
    }

    /// Streams `len` bytes of `path` starting at `offset`.
    pub fn with_file_range(mut self, path: impl Into<PathBuf>, offset: u64, len: u64) -> Self {
        self.body = Some(FileRange {
            path: path.into(),
            offset,
            len,
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: http::StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// The `ETag` header verbatim, quotes included.
    pub fn etag(&self) -> Option<String> {
        self.headers
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    }
}
