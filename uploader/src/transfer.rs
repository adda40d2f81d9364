use std::path::Path;

use http::HeaderValue;
use http::StatusCode;
use http::header::USER_AGENT;
use replay_http_client::HttpTransport;
use replay_http_client::Request;
use replay_http_client::Response;
use replay_http_client::RetryPolicy;
use replay_http_client::TransportError;
use replay_http_client::default_user_agent;
use replay_http_client::redact_query;
use replay_http_client::run_with_retry;
use tracing::debug;

use crate::error::Result;
use crate::error::UploadError;

/// A PUT of `len` bytes of `path` starting at `offset`.
pub(crate) fn storage_put(url: &str, path: &Path, offset: u64, len: u64) -> Request {
    let mut request = Request::put(url).with_file_range(path, offset, len);
    if let Ok(value) = HeaderValue::from_str(&default_user_agent()) {
        request.headers.insert(USER_AGENT, value);
    }
    request
}

/// One PUT attempt. Storage acknowledges with exactly 200; any other status
/// is treated like a transport failure.
async fn put_once(transport: &dyn HttpTransport, request: Request) -> Result<Response> {
    let url = request.url.clone();
    let response = transport.execute(request).await?;
    if response.status != StatusCode::OK {
        return Err(TransportError::Http {
            status: response.status,
            url: Some(redact_query(&url).to_string()),
            headers: Some(response.headers),
            body: None,
        }
        .into());
    }
    Ok(response)
}

/// Streams the whole file to `url`, retrying under `policy`.
pub(crate) async fn put_file(
    transport: &dyn HttpTransport,
    url: &str,
    path: &Path,
    len: u64,
    policy: &RetryPolicy,
) -> Result<()> {
    run_with_retry(policy, UploadError::is_retryable, |attempt| {
        debug!(attempt, len, "uploading recording");
        put_once(transport, storage_put(url, path, 0, len))
    })
    .await?;
    Ok(())
}

/// Uploads one part and returns the storage ETag. A 200 without an ETag is
/// retried like any other failure.
pub(crate) async fn put_part(
    transport: &dyn HttpTransport,
    index: usize,
    url: &str,
    path: &Path,
    offset: u64,
    len: u64,
    policy: &RetryPolicy,
) -> Result<String> {
    run_with_retry(policy, UploadError::is_retryable, |attempt| async move {
        debug!(index, attempt, offset, len, "uploading part");
        let response = put_once(transport, storage_put(url, path, offset, len)).await?;
        response.etag().ok_or(UploadError::MissingEtag { index })
    })
    .await
}
