use std::path::PathBuf;
use std::sync::Arc;

use replay_http_client::HttpTransport;
use replay_http_client::RetryPolicy;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::Result;
use crate::error::UploadError;
use crate::transfer::put_part;

/// Everything a worker needs to upload one part.
pub(crate) struct PartInput {
    pub index: usize,
    pub url: String,
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
    pub retry: RetryPolicy,
    pub transport: Arc<dyn HttpTransport>,
}

/// Starts a worker task that accepts exactly one [`PartInput`] and answers
/// with exactly one output. A worker that dies (panics or is dropped by the
/// runtime) closes its output channel instead.
fn spawn_part_worker() -> (oneshot::Sender<PartInput>, oneshot::Receiver<Result<String>>) {
    let (tx_input, rx_input) = oneshot::channel::<PartInput>();
    let (tx_output, rx_output) = oneshot::channel::<Result<String>>();
    tokio::spawn(async move {
        let Ok(input) = rx_input.await else {
            return;
        };
        let result = put_part(
            input.transport.as_ref(),
            input.index,
            &input.url,
            &input.path,
            input.offset,
            input.len,
            &input.retry,
        )
        .await;
        let _ = tx_output.send(result);
    });
    (tx_input, rx_output)
}

/// Uploads one part on its own worker and returns its ETag.
pub(crate) async fn run_part(input: PartInput) -> Result<String> {
    let index = input.index;
    let (tx_input, rx_output) = spawn_part_worker();
    if tx_input.send(input).is_err() {
        return Err(UploadError::WorkerLost { index });
    }
    rx_output.await.unwrap_or_else(|_| {
        warn!(index, "part worker exited without a result");
        Err(UploadError::WorkerLost { index })
    })
}
