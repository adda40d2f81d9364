use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Error code the server attaches to commands rejected for lack of a valid
/// access token.
pub const AUTHENTICATION_REQUIRED_CODE: i64 = 49;

pub type Result<T> = std::result::Result<T, ClientError>;

/// An `{id, error}` reply from the server.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("protocol error {code}: {message}")]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProtocolError {
    pub fn is_authentication_required(&self) -> bool {
        self.code == AUTHENTICATION_REQUIRED_CODE
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("websocket transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("malformed authentication response: {0}")]
    MalformedAuthResponse(Value),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_authentication_required(&self) -> bool {
        matches!(self, ClientError::Protocol(err) if err.is_authentication_required())
    }

    /// Whether issuing the same command again, possibly on a fresh
    /// connection, could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect { .. } | ClientError::Transport(_) | ClientError::Closed => true,
            ClientError::Protocol(err) => !err.is_authentication_required(),
            ClientError::MalformedAuthResponse(_) | ClientError::Encode(_) => false,
        }
    }
}
