use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http {status}: {body:?}")]
    Http {
        status: StatusCode,
        url: Option<String>,
        headers: Option<HeaderMap>,
        body: Option<String>,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("failed to read request body: {0}")]
    Body(#[from] std::io::Error),
}

impl TransportError {
    /// Every storage response and network failure counts as transient. A body
    /// file that cannot be read fails the same way on the next attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Body(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
