use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordingLogError>;

#[derive(Debug, Error)]
pub enum RecordingLogError {
    #[error("recording log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode recording log line: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no recording with id {0}")]
    UnknownRecording(String),
}
