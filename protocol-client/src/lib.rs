//! A correlation-based request/response client for the recording server.
//!
//! Commands go out as `{id, method, params, ...}` text frames (optionally
//! followed by one binary frame) and are answered by `{id, result}` or
//! `{id, error}`. Frames without an id are events, routed to at most one
//! listener per method.

mod channel;
mod client;
mod error;
mod message;
mod ws;

pub use crate::channel::CommandChannel;
pub use crate::channel::Connector;
pub use crate::channel::WebSocketConnector;
pub use crate::client::CredentialsProvider;
pub use crate::client::EventCallback;
pub use crate::client::ProtocolClient;
pub use crate::client::SET_ACCESS_TOKEN_METHOD;
pub use crate::error::AUTHENTICATION_REQUIRED_CODE;
pub use crate::error::ClientError;
pub use crate::error::ProtocolError;
pub use crate::error::Result;
pub use crate::message::Command;
