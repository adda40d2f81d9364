use crate::default_client::redact_query;
use crate::default_client::request_ids;
use crate::error::TransportError;
use crate::request::FileRange;
use crate::request::Request;
use crate::request::Response;
use async_trait::async_trait;
use std::io::SeekFrom;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use tracing::trace;

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn build(&self, req: Request) -> Result<reqwest::RequestBuilder, TransportError> {
        let Request {
            method,
            url,
            headers,
            body,
        } = req;

        let builder = self.client.request(method, &url).headers(headers);
        let Some(FileRange { path, offset, len }) = body else {
            return Ok(builder);
        };
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let stream = ReaderStream::new(file.take(len));
        Ok(builder
            .header(http::header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(stream)))
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        let method = req.method.clone();
        let url = redact_query(&req.url).to_string();
        trace!(
            "{method} to {url} ({:?} bytes)",
            req.body.as_ref().map(|body| body.len)
        );

        let builder = self.build(req).await?;
        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(%method, %url, error = %err, "storage request failed");
                return Err(Self::map_error(err));
            }
        };
        let status = resp.status();
        let headers = resp.headers().clone();
        debug!(
            %method,
            %url,
            %status,
            request_ids = ?request_ids(&headers),
            "storage request completed"
        );

        let bytes = resp.bytes().await.map_err(Self::map_error)?;
        if !status.is_success() {
            let body = String::from_utf8(bytes.to_vec()).ok();
            return Err(TransportError::Http {
                status,
                url: Some(url),
                headers: Some(headers),
                body,
            });
        }
        Ok(Response {
            status,
            headers,
            body: bytes,
        })
    }
}
