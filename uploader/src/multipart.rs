use std::path::Path;
use std::sync::Arc;

use replay_http_client::HttpTransport;
use replay_http_client::RetryPolicy;
use replay_work_queue::JobHandle;
use replay_work_queue::WorkQueue;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::UploadError;
use crate::part_worker::PartInput;
use crate::part_worker::run_part;

/// One contiguous byte range and the link it is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
    pub url: String,
}

/// Splits `length` bytes into consecutive `chunk_size` ranges, one per link.
/// The ranges cover the file exactly; only the last one may be short.
pub fn plan_parts(length: u64, chunk_size: u64, links: &[String]) -> Result<Vec<PartPlan>> {
    let method = "Internal.beginRecordingMultipartUpload";
    if chunk_size == 0 {
        return Err(UploadError::UnexpectedResponse {
            method: method.to_string(),
            message: "chunk size is zero".to_string(),
        });
    }
    let needed = length.div_ceil(chunk_size);
    if needed != links.len() as u64 {
        return Err(UploadError::UnexpectedResponse {
            method: method.to_string(),
            message: format!(
                "{length} bytes in {chunk_size} byte chunks need {needed} part links, got {}",
                links.len()
            ),
        });
    }
    Ok(links
        .iter()
        .enumerate()
        .map(|(index, url)| {
            let offset = index as u64 * chunk_size;
            PartPlan {
                index,
                offset,
                len: chunk_size.min(length - offset),
                url: url.clone(),
            }
        })
        .collect())
}

/// Uploads every part on a fork of `part_queue` and returns the ETags in part
/// order. All parts run to completion even when one fails; the first failure
/// (in part order) is returned.
pub(crate) async fn upload_parts(
    part_queue: &WorkQueue,
    parts: Vec<PartPlan>,
    path: &Path,
    transport: &Arc<dyn HttpTransport>,
    retry: &RetryPolicy,
) -> Result<Vec<String>> {
    let fork = part_queue.fork();
    let handles: Vec<JobHandle<Result<String>>> = parts
        .into_iter()
        .map(|part| {
            let input = PartInput {
                index: part.index,
                url: part.url,
                path: path.to_path_buf(),
                offset: part.offset,
                len: part.len,
                retry: retry.clone(),
                transport: Arc::clone(transport),
            };
            fork.add(move || run_part(input))
        })
        .collect();
    debug!(parts = handles.len(), "queued recording parts");

    let mut etags = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(etag)) => etags.push(etag),
            Ok(Err(err)) => {
                warn!(index, "part upload failed: {err}");
                first_error.get_or_insert(err);
            }
            Err(aborted) => {
                warn!(index, "part upload aborted");
                first_error.get_or_insert(aborted.into());
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(etags),
    }
}
