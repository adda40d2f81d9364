use std::path::PathBuf;
use std::time::Duration;

use replay_http_client::TransportError;
use replay_protocol_client::ClientError;
use replay_recording_log::RecordingLogError;
use replay_recording_log::RecordingStatus;
use replay_work_queue::JobAborted;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

/// Why a recording was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("recording is unusable: {0}")]
    Unusable(String),

    #[error("recording status {0} cannot be uploaded")]
    Status(RecordingStatus),

    #[error("recording has no file")]
    NoPath,

    #[error("recording file {} is missing", .0.display())]
    FileMissing(PathBuf),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no recording with id {0}")]
    UnknownRecording(String),

    #[error("recording {id} skipped: {reason}")]
    Skipped { id: String, reason: SkipReason },

    #[error("invalid recording metadata: {0}")]
    InvalidMetadata(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{method} timed out after {timeout:?}")]
    RpcTimeout {
        method: String,
        timeout: Duration,
    },

    #[error("unexpected response to {method}: {message}")]
    UnexpectedResponse { method: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("part {index} response has no ETag")]
    MissingEtag { index: usize },

    #[error("part {index} worker exited without a result")]
    WorkerLost { index: usize },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Log(#[from] RecordingLogError),

    #[error("upload job aborted")]
    Aborted(#[from] JobAborted),
}

impl UploadError {
    /// Whether the failed step may succeed if attempted again. Servers that
    /// demand authentication are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Client(err) => err.is_retryable(),
            UploadError::Transport(err) => err.is_retryable(),
            UploadError::RpcTimeout { .. } | UploadError::MissingEtag { .. } => true,
            UploadError::UnknownRecording(_)
            | UploadError::Skipped { .. }
            | UploadError::InvalidMetadata(_)
            | UploadError::UnexpectedResponse { .. }
            | UploadError::WorkerLost { .. }
            | UploadError::Io { .. }
            | UploadError::Log(_)
            | UploadError::Aborted(_) => false,
        }
    }

    pub fn is_authentication_required(&self) -> bool {
        matches!(self, UploadError::Client(err) if err.is_authentication_required())
    }
}
